//! The narrow slice of an issue tracker the poller depends on.
//!
//! Wire-level clients (GraphQL, REST) live outside this crate and implement
//! [`TrackerClient`]. [`InMemoryTracker`] is a complete in-process
//! implementation for local runs and tests.

pub mod memory;

pub use memory::{InMemoryTracker, TrackerCall};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ItemId, LabelId, WorkItem};

/// Workflow state types requested when the caller does not narrow them.
pub const DEFAULT_STATUS_TYPES: &[&str] = &["backlog", "unstarted", "started"];

/// Maximum number of items requested per list call.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Server-side filter for [`TrackerClient::list_items`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    /// Team or workspace scope.
    pub scope: String,
    /// Only items carrying a label with this name.
    pub label: String,
    /// Restrict to these projects. Empty means all projects.
    pub project_ids: Vec<String>,
    /// Workflow state types to include.
    pub status_types: Vec<String>,
    pub limit: usize,
}

impl ListFilter {
    pub fn new(scope: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            label: label.into(),
            project_ids: Vec::new(),
            status_types: DEFAULT_STATUS_TYPES.iter().map(|s| s.to_string()).collect(),
            limit: DEFAULT_PAGE_SIZE,
        }
    }

    /// Same filter, different label.
    pub fn for_label(&self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..self.clone()
        }
    }
}

/// Label and item operations against an external tracker.
///
/// Implementations must be safe to call from the poll loop and from many
/// workers at once.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Look up an existing label. Fails with `LabelNotFound` when absent.
    async fn resolve_label(&self, scope: &str, name: &str) -> Result<LabelId>;

    /// Look up a label, creating it with `color` on first use.
    async fn get_or_create_label(&self, scope: &str, name: &str, color: &str) -> Result<LabelId>;

    async fn list_items(&self, filter: &ListFilter) -> Result<Vec<WorkItem>>;

    async fn add_label(&self, item: &ItemId, label: &LabelId) -> Result<()>;

    async fn remove_label(&self, item: &ItemId, label: &LabelId) -> Result<()>;
}
