//! In-memory dedup cache with optional write-through to a ledger.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::ledger::ProcessedLedger;
use crate::model::{ItemId, ProcessedTag};

/// When the poller decided on an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub id: ItemId,
    pub decided_at: DateTime<Utc>,
}

/// Item IDs already decided on. Read by the scan loop, written by the loop,
/// by workers, and by operators clearing entries for retry.
///
/// Every write that touches the ledger holds `writes` across both the cache
/// update and the ledger call, so the ledger always ends up agreeing with the
/// cache about the last writer.
pub(crate) struct DedupCache {
    entries: RwLock<HashMap<ItemId, DispatchRecord>>,
    ledger: Option<Arc<dyn ProcessedLedger>>,
    writes: Mutex<()>,
}

impl DedupCache {
    /// Build the cache, bulk-loading every ID the ledger already holds.
    ///
    /// If the ledger cannot be read the cache runs without it: dedup then
    /// only holds for this process's lifetime.
    pub(crate) async fn hydrate(ledger: Option<Arc<dyn ProcessedLedger>>) -> Self {
        let mut entries = HashMap::new();
        let ledger = match ledger {
            None => None,
            Some(ledger) => match ledger.load_all().await {
                Ok(ids) => {
                    let now = Utc::now();
                    for id in ids {
                        entries.insert(
                            id.clone(),
                            DispatchRecord {
                                id,
                                decided_at: now,
                            },
                        );
                    }
                    if !entries.is_empty() {
                        info!(count = entries.len(), "loaded processed items from ledger");
                    }
                    Some(ledger)
                }
                Err(e) => {
                    warn!(error = %e, "failed to load processed items, continuing without ledger");
                    None
                }
            },
        };
        Self {
            entries: RwLock::new(entries),
            ledger,
            writes: Mutex::new(()),
        }
    }

    pub(crate) fn has_ledger(&self) -> bool {
        self.ledger.is_some()
    }

    pub(crate) fn contains(&self, id: &ItemId) -> bool {
        self.entries.read().contains_key(id)
    }

    pub(crate) fn get(&self, id: &ItemId) -> Option<DispatchRecord> {
        self.entries.read().get(id).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Record a decision in memory, then in the ledger.
    pub(crate) async fn mark(&self, id: &ItemId, tag: ProcessedTag) {
        let _writes = self.writes.lock().await;
        self.entries.write().insert(
            id.clone(),
            DispatchRecord {
                id: id.clone(),
                decided_at: Utc::now(),
            },
        );
        self.persist(id, tag).await;
    }

    /// Update the ledger's outcome for an item still held in the cache.
    pub(crate) async fn record_outcome(&self, id: &ItemId, tag: ProcessedTag) {
        let _writes = self.writes.lock().await;
        if self.contains(id) {
            self.persist(id, tag).await;
        }
    }

    /// Forget one item here and in the ledger so it can be dispatched again.
    pub(crate) async fn clear(&self, id: &ItemId) {
        let _writes = self.writes.lock().await;
        self.entries.write().remove(id);
        if let Some(ref ledger) = self.ledger {
            if let Err(e) = ledger.unmark(id).await {
                warn!(item = %id, error = %e, "failed to unmark item in ledger");
            }
        }
    }

    /// Drop every in-memory entry. The ledger is left untouched.
    pub(crate) fn reset(&self) {
        self.entries.write().clear();
    }

    async fn persist(&self, id: &ItemId, tag: ProcessedTag) {
        if let Some(ref ledger) = self.ledger {
            if let Err(e) = ledger.mark(id, tag).await {
                warn!(item = %id, outcome = %tag, error = %e, "failed to persist processed item");
            }
        }
    }
}
