//! Downstream notification when an execution produced an artifact.
//!
//! Decouples the poller from whatever consumes its output (e.g. a pull
//! request lifecycle controller). Notifiers are called from worker tasks
//! while the pool slot is still held, so they must not block.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::model::{Artifact, ItemId};

/// An artifact created while executing a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactNotice {
    pub item_id: ItemId,
    pub identifier: String,
    /// Correlates the notice with the dispatch span and logs.
    pub dispatch_id: Uuid,
    pub artifact: Artifact,
}

/// Fire-and-forget receiver of [`ArtifactNotice`]s.
pub trait DownstreamNotifier: Send + Sync {
    fn artifact_created(&self, notice: ArtifactNotice);
}

/// Forwards notices over an unbounded channel.
///
/// Sending never waits; if the receiver is gone the notice is logged and
/// dropped.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ArtifactNotice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ArtifactNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DownstreamNotifier for ChannelNotifier {
    fn artifact_created(&self, notice: ArtifactNotice) {
        if let Err(e) = self.tx.send(notice) {
            warn!(
                item = %e.0.item_id,
                artifact = e.0.artifact.number,
                "downstream receiver closed, dropping artifact notice"
            );
        }
    }
}
