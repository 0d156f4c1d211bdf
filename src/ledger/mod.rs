//! Durable record of which work items have already been dispatched.
//!
//! The poller hydrates its dedup cache from the ledger at construction and
//! writes every decision through to it, so a restarted process never
//! re-dispatches work an earlier instance already took.

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::Result;
use crate::model::{ItemId, ProcessedTag};

#[async_trait]
pub trait ProcessedLedger: Send + Sync {
    /// Every item ID currently marked.
    async fn load_all(&self) -> Result<HashSet<ItemId>>;

    /// Mark an item, replacing any earlier outcome.
    async fn mark(&self, id: &ItemId, outcome: ProcessedTag) -> Result<()>;

    async fn unmark(&self, id: &ItemId) -> Result<()>;

    async fn is_marked(&self, id: &ItemId) -> Result<bool>;

    /// Drop records last marked more than `age` ago. Returns how many went.
    async fn purge_older_than(&self, age: chrono::Duration) -> Result<u64>;
}

/// Oldest timestamp a purge of `age` keeps, or `None` when `age` reaches past
/// the earliest representable time and nothing can be old enough.
pub(crate) fn purge_cutoff(age: chrono::Duration) -> Option<DateTime<Utc>> {
    Utc::now().checked_sub_signed(age)
}
