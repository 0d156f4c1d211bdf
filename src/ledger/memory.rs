//! Ledger kept in process memory. Survives nothing; useful for local runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use super::ProcessedLedger;
use crate::error::Result;
use crate::model::{ItemId, ProcessedTag};

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<ItemId, (ProcessedTag, DateTime<Utc>)>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger pre-populated as if an earlier process had dispatched `ids`.
    pub fn with_marked<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        let entries = ids
            .into_iter()
            .map(|id| (ItemId(id.into()), (ProcessedTag::Dispatched, now)))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Latest outcome recorded for an item.
    pub fn outcome(&self, id: &ItemId) -> Option<ProcessedTag> {
        self.entries.lock().get(id).map(|(tag, _)| *tag)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Backdate an entry, for exercising purges.
    pub fn set_marked_at(&self, id: &ItemId, at: DateTime<Utc>) {
        if let Some(entry) = self.entries.lock().get_mut(id) {
            entry.1 = at;
        }
    }
}

#[async_trait]
impl ProcessedLedger for MemoryLedger {
    async fn load_all(&self) -> Result<HashSet<ItemId>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }

    async fn mark(&self, id: &ItemId, outcome: ProcessedTag) -> Result<()> {
        self.entries.lock().insert(id.clone(), (outcome, Utc::now()));
        Ok(())
    }

    async fn unmark(&self, id: &ItemId) -> Result<()> {
        self.entries.lock().remove(id);
        Ok(())
    }

    async fn is_marked(&self, id: &ItemId) -> Result<bool> {
        Ok(self.entries.lock().contains_key(id))
    }

    async fn purge_older_than(&self, age: chrono::Duration) -> Result<u64> {
        let Some(cutoff) = super::purge_cutoff(age) else {
            return Ok(0);
        };
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (_, at)| *at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}
