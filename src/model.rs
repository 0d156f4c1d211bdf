//! Core data model.
//!
//! A work item is a tracker-owned issue the poller may dispatch. The poller only
//! ever holds read-only snapshots fetched per scan; labels are the only state it
//! writes back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Tracker-assigned work item ID. Opaque: never assumed to be numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Tracker-assigned label ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(pub String);

impl LabelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LabelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A label attached to a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub name: String,
}

/// Snapshot of a tracker work item as returned by one list call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,

    /// Human-facing key (e.g. "ENG-123"). Falls back to the ID when the
    /// tracker has no separate key.
    pub identifier: String,

    pub title: String,

    /// Project the item belongs to, if the tracker groups items that way.
    pub project: Option<String>,

    pub labels: Vec<Label>,

    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let id = id.into();
        Self {
            identifier: id.clone(),
            id: ItemId(id),
            title: title.into(),
            project: None,
            labels: Vec::new(),
            created_at,
        }
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// Does the item carry a label with this name?
    pub fn has_label_named(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Follow-on artifact produced by an execution, typically a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub number: u64,
    pub url: String,
    pub head_sha: Option<String>,
    pub branch: Option<String>,
}

/// What an executor reports back for one work item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Overall success. Only a successful result earns the done label.
    pub success: bool,
    pub artifact: Option<Artifact>,
}

impl ExecutionResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            artifact: None,
        }
    }

    pub fn unsuccessful() -> Self {
        Self {
            success: false,
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

// ---------------------------------------------------------------------------
// Processed outcome
// ---------------------------------------------------------------------------

/// Outcome tag stored alongside a processed item in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedTag {
    /// Handed to a worker; execution not yet finished.
    Dispatched,
    /// Already carried a status label when first seen.
    Skipped,
    /// Executor returned a successful result.
    Succeeded,
    /// Executor returned a result that reported failure.
    Unsuccessful,
    /// Executor returned an error.
    Failed,
}

impl ProcessedTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessedTag::Dispatched => "dispatched",
            ProcessedTag::Skipped => "skipped",
            ProcessedTag::Succeeded => "succeeded",
            ProcessedTag::Unsuccessful => "unsuccessful",
            ProcessedTag::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessedTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessedTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispatched" => Ok(ProcessedTag::Dispatched),
            "skipped" => Ok(ProcessedTag::Skipped),
            "succeeded" => Ok(ProcessedTag::Succeeded),
            "unsuccessful" => Ok(ProcessedTag::Unsuccessful),
            "failed" => Ok(ProcessedTag::Failed),
            other => Err(format!("unknown processed tag: {other}")),
        }
    }
}
