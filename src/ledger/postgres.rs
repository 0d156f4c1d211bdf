//! Ledger stored in Postgres, one row per (adapter, item).

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use super::ProcessedLedger;
use crate::db::Db;
use crate::error::Result;
use crate::model::{ItemId, ProcessedTag};

/// [`ProcessedLedger`] over the `processed_items` table.
///
/// `adapter` namespaces the rows so several trackers can share one table.
pub struct PgLedger {
    db: Arc<Db>,
    adapter: String,
}

impl PgLedger {
    pub fn new(db: Arc<Db>, adapter: impl Into<String>) -> Self {
        Self {
            db,
            adapter: adapter.into(),
        }
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }
}

#[async_trait]
impl ProcessedLedger for PgLedger {
    async fn load_all(&self) -> Result<HashSet<ItemId>> {
        let ids = self.db.load_processed(&self.adapter).await?;
        Ok(ids.into_iter().map(ItemId).collect())
    }

    async fn mark(&self, id: &ItemId, outcome: ProcessedTag) -> Result<()> {
        self.db
            .mark_processed(&self.adapter, id.as_str(), outcome.as_str())
            .await
    }

    async fn unmark(&self, id: &ItemId) -> Result<()> {
        self.db.unmark_processed(&self.adapter, id.as_str()).await?;
        Ok(())
    }

    async fn is_marked(&self, id: &ItemId) -> Result<bool> {
        self.db.is_processed(&self.adapter, id.as_str()).await
    }

    async fn purge_older_than(&self, age: chrono::Duration) -> Result<u64> {
        let Some(cutoff) = super::purge_cutoff(age) else {
            return Ok(0);
        };
        self.db.purge_processed(&self.adapter, cutoff).await
    }
}
