//! Status labels as a state machine: pending → in-progress → done | failed.
//!
//! Every mutation is best-effort and independent of the others. A failed
//! removal of the in-progress label never stops the done or failed label from
//! being applied; the tracker treats them as separate fields, not one
//! transaction.

use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::{ItemId, LabelId, WorkItem};
use crate::telemetry::metrics;
use crate::tracker::{ListFilter, TrackerClient};

/// Colors used when the poller has to create a status label.
const IN_PROGRESS_COLOR: &str = "#0066FF";
const DONE_COLOR: &str = "#00AA55";
const FAILED_COLOR: &str = "#DD0000";

/// Logical role a label plays for the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelRole {
    /// Applied by a human to request dispatch.
    Trigger,
    InProgress,
    Done,
    Failed,
}

impl std::fmt::Display for LabelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LabelRole::Trigger => "trigger",
            LabelRole::InProgress => "in_progress",
            LabelRole::Done => "done",
            LabelRole::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Tracker label names for each role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelNames {
    pub trigger: String,
    pub in_progress: String,
    pub done: String,
    pub failed: String,
}

impl Default for LabelNames {
    fn default() -> Self {
        Self {
            trigger: "pilot".to_string(),
            in_progress: "pilot-in-progress".to_string(),
            done: "pilot-done".to_string(),
            failed: "pilot-failed".to_string(),
        }
    }
}

impl LabelNames {
    pub fn name(&self, role: LabelRole) -> &str {
        match role {
            LabelRole::Trigger => &self.trigger,
            LabelRole::InProgress => &self.in_progress,
            LabelRole::Done => &self.done,
            LabelRole::Failed => &self.failed,
        }
    }

    /// Is `name` one of the three status labels?
    pub fn is_status(&self, name: &str) -> bool {
        name == self.in_progress || name == self.done || name == self.failed
    }
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Add,
    Remove,
}

impl Mutation {
    fn as_str(self) -> &'static str {
        match self {
            Mutation::Add => "add",
            Mutation::Remove => "remove",
        }
    }
}

/// Resolved label IDs plus the tracker to apply them through.
///
/// IDs are resolved once per run and never change afterwards. A status label
/// that could not be resolved is `None`, and transitions involving it are
/// skipped.
pub struct LabelStateMachine {
    tracker: Arc<dyn TrackerClient>,
    names: LabelNames,
    trigger: LabelId,
    in_progress: Option<LabelId>,
    done: Option<LabelId>,
    failed: Option<LabelId>,
}

impl LabelStateMachine {
    /// Resolve the trigger label and get-or-create the status labels.
    ///
    /// # Errors
    ///
    /// Only a missing trigger label is an error. Status labels that cannot be
    /// created are logged and left unresolved.
    pub async fn resolve(
        tracker: Arc<dyn TrackerClient>,
        scope: &str,
        names: LabelNames,
    ) -> Result<Self> {
        let trigger = tracker
            .resolve_label(scope, &names.trigger)
            .await
            .map_err(|source| Error::TriggerLabel {
                scope: scope.to_string(),
                name: names.trigger.clone(),
                source: Box::new(source),
            })?;

        let client = tracker.as_ref();
        let in_progress =
            ensure(client, scope, &names, LabelRole::InProgress, IN_PROGRESS_COLOR).await;
        let done = ensure(client, scope, &names, LabelRole::Done, DONE_COLOR).await;
        let failed = ensure(client, scope, &names, LabelRole::Failed, FAILED_COLOR).await;

        Ok(Self {
            tracker,
            names,
            trigger,
            in_progress,
            done,
            failed,
        })
    }

    pub fn id(&self, role: LabelRole) -> Option<&LabelId> {
        match role {
            LabelRole::Trigger => Some(&self.trigger),
            LabelRole::InProgress => self.in_progress.as_ref(),
            LabelRole::Done => self.done.as_ref(),
            LabelRole::Failed => self.failed.as_ref(),
        }
    }

    /// Does the item already belong to an earlier or concurrent run?
    pub fn has_status_label(&self, item: &WorkItem) -> bool {
        item.labels.iter().any(|label| {
            self.names.is_status(&label.name)
                || [&self.in_progress, &self.done, &self.failed]
                    .into_iter()
                    .flatten()
                    .any(|id| *id == label.id)
        })
    }

    /// Pending → in-progress.
    pub async fn claim(&self, item: &WorkItem) {
        if self.apply(item, LabelRole::InProgress, Mutation::Add).await {
            record_transition(&self.names.trigger, &self.names.in_progress);
        }
    }

    /// In-progress → failed.
    pub async fn fail(&self, item: &WorkItem) {
        self.apply(item, LabelRole::InProgress, Mutation::Remove).await;
        if self.apply(item, LabelRole::Failed, Mutation::Add).await {
            record_transition(&self.names.in_progress, &self.names.failed);
        }
    }

    /// In-progress → done, or just out of in-progress when the execution
    /// reported failure without erroring.
    pub async fn finish(&self, item: &WorkItem, success: bool) {
        self.apply(item, LabelRole::InProgress, Mutation::Remove).await;
        if success && self.apply(item, LabelRole::Done, Mutation::Add).await {
            record_transition(&self.names.in_progress, &self.names.done);
        }
    }

    /// Strip the in-progress label from items a previous process left behind.
    ///
    /// Returns the IDs whose label was removed. Items that fail are logged
    /// and skipped; a partial recovery is acceptable.
    pub async fn recover_orphans(&self, filter: &ListFilter) -> Vec<ItemId> {
        let Some(in_progress) = self.in_progress.clone() else {
            return Vec::new();
        };

        let orphans = match self
            .tracker
            .list_items(&filter.for_label(&self.names.in_progress))
            .await
        {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "failed to check for orphaned items");
                return Vec::new();
            }
        };

        if orphans.is_empty() {
            return Vec::new();
        }
        info!(count = orphans.len(), "recovering orphaned in-progress items");

        let mut recovered = Vec::with_capacity(orphans.len());
        for item in orphans {
            if let Err(e) = self.tracker.remove_label(&item.id, &in_progress).await {
                warn!(
                    item = %item.id,
                    identifier = %item.identifier,
                    error = %e,
                    "failed to remove in-progress label from orphaned item"
                );
                continue;
            }
            info!(
                item = %item.id,
                identifier = %item.identifier,
                title = %item.title,
                "recovered orphaned item"
            );
            metrics::orphans_recovered().add(1, &[]);
            recovered.push(item.id);
        }
        recovered
    }

    /// Apply one mutation, logging and counting the outcome. Returns whether
    /// it went through.
    async fn apply(&self, item: &WorkItem, role: LabelRole, mutation: Mutation) -> bool {
        let Some(label) = self.id(role) else {
            return false;
        };
        let result = match mutation {
            Mutation::Add => self.tracker.add_label(&item.id, label).await,
            Mutation::Remove => self.tracker.remove_label(&item.id, label).await,
        };
        let attrs = |outcome: &'static str| {
            [
                KeyValue::new("role", role.to_string()),
                KeyValue::new("operation", mutation.as_str()),
                KeyValue::new("result", outcome),
            ]
        };
        match result {
            Ok(()) => {
                metrics::label_mutations().add(1, &attrs("ok"));
                true
            }
            Err(e) => {
                metrics::label_mutations().add(1, &attrs("error"));
                warn!(
                    item = %item.id,
                    identifier = %item.identifier,
                    role = %role,
                    operation = mutation.as_str(),
                    error = %e,
                    "label mutation failed"
                );
                false
            }
        }
    }
}

async fn ensure(
    tracker: &dyn TrackerClient,
    scope: &str,
    names: &LabelNames,
    role: LabelRole,
    color: &str,
) -> Option<LabelId> {
    let name = names.name(role);
    match tracker.get_or_create_label(scope, name, color).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(label = name, role = %role, error = %e, "failed to get or create status label");
            None
        }
    }
}

fn record_transition(from: &str, to: &str) {
    crate::telemetry::dispatch::record_label_transition(&tracing::Span::current(), from, to);
}
