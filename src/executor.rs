//! The seam where a dispatched work item actually gets done.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::model::{ExecutionResult, WorkItem};

/// Performs the work for one dispatched item.
///
/// Called concurrently from up to `max_concurrent` workers. `cancel` is the
/// poller's shutdown token: running executions are never aborted, but an
/// implementation should return promptly once it fires.
///
/// Returning `Err` (or panicking) marks the item failed; an `Ok` result with
/// `success == false` leaves it without a done label.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(
        &self,
        cancel: CancellationToken,
        item: &WorkItem,
    ) -> anyhow::Result<ExecutionResult>;
}
