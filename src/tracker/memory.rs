//! In-process tracker: label registry, items, and a log of every call.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

use super::{ListFilter, TrackerClient};
use crate::error::{Error, Result};
use crate::model::{ItemId, Label, LabelId, WorkItem};

/// A call observed by [`InMemoryTracker`], in the order it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    ResolveLabel { name: String },
    GetOrCreateLabel { name: String },
    ListItems { label: String },
    AddLabel { item: ItemId, label: String },
    RemoveLabel { item: ItemId, label: String },
}

#[derive(Debug, Clone)]
struct LabelDef {
    scope: String,
    label: Label,
    color: Option<String>,
}

#[derive(Default)]
struct TrackerState {
    labels: Vec<LabelDef>,
    items: Vec<WorkItem>,
    calls: Vec<TrackerCall>,
    next_label: u64,
    failing_lists: usize,
    failing_labels: HashSet<String>,
    refuse_creation: bool,
}

impl TrackerState {
    fn define(&mut self, scope: &str, name: &str, color: Option<&str>) -> LabelId {
        if let Some(def) = self
            .labels
            .iter()
            .find(|d| d.scope == scope && d.label.name == name)
        {
            return def.label.id.clone();
        }
        self.next_label += 1;
        let id = LabelId(format!("label-{}", self.next_label));
        self.labels.push(LabelDef {
            scope: scope.to_string(),
            label: Label {
                id: id.clone(),
                name: name.to_string(),
            },
            color: color.map(str::to_string),
        });
        id
    }

    fn label_by_id(&self, id: &LabelId) -> Result<Label> {
        self.labels
            .iter()
            .find(|d| &d.label.id == id)
            .map(|d| d.label.clone())
            .ok_or_else(|| Error::Tracker(format!("unknown label id {id}")))
    }

    fn item_mut(&mut self, id: &ItemId) -> Result<&mut WorkItem> {
        self.items
            .iter_mut()
            .find(|i| &i.id == id)
            .ok_or_else(|| Error::Tracker(format!("unknown item {id}")))
    }

    fn check_mutation(&self, label: &Label) -> Result<()> {
        if self.failing_labels.contains(&label.name) {
            return Err(Error::Tracker(format!(
                "label mutation rejected for {}",
                label.name
            )));
        }
        Ok(())
    }
}

/// A [`TrackerClient`] backed by process memory.
///
/// Items are returned in insertion order, not creation order, so callers
/// cannot accidentally rely on the tracker sorting for them.
#[derive(Default)]
pub struct InMemoryTracker {
    state: Mutex<TrackerState>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a label (idempotent) and return it for attaching to items.
    pub fn label(&self, scope: &str, name: &str) -> Label {
        let mut state = self.state.lock();
        let id = state.define(scope, name, None);
        Label {
            id,
            name: name.to_string(),
        }
    }

    pub fn insert_item(&self, item: WorkItem) {
        let mut state = self.state.lock();
        state.items.retain(|i| i.id != item.id);
        state.items.push(item);
    }

    pub fn item(&self, id: &ItemId) -> Option<WorkItem> {
        self.state.lock().items.iter().find(|i| &i.id == id).cloned()
    }

    /// Names of the labels currently attached to an item.
    pub fn label_names(&self, id: &ItemId) -> Vec<String> {
        self.item(id)
            .map(|i| i.labels.into_iter().map(|l| l.name).collect())
            .unwrap_or_default()
    }

    /// Remove a label by name outside of the client API, as an operator would.
    pub fn detach_label(&self, id: &ItemId, name: &str) {
        let mut state = self.state.lock();
        if let Ok(item) = state.item_mut(id) {
            item.labels.retain(|l| l.name != name);
        }
    }

    /// Color a label was created with, if it was created through the client.
    pub fn label_color(&self, scope: &str, name: &str) -> Option<String> {
        self.state
            .lock()
            .labels
            .iter()
            .find(|d| d.scope == scope && d.label.name == name)
            .and_then(|d| d.color.clone())
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.state.lock().calls.clone()
    }

    /// Make the next `n` list calls fail.
    pub fn fail_next_lists(&self, n: usize) {
        self.state.lock().failing_lists = n;
    }

    /// Reject every add/remove of the named label.
    pub fn fail_mutations_for(&self, label_name: &str) {
        self.state
            .lock()
            .failing_labels
            .insert(label_name.to_string());
    }

    /// Refuse to create labels that do not exist yet.
    pub fn refuse_label_creation(&self) {
        self.state.lock().refuse_creation = true;
    }
}

#[async_trait]
impl TrackerClient for InMemoryTracker {
    async fn resolve_label(&self, scope: &str, name: &str) -> Result<LabelId> {
        let mut state = self.state.lock();
        state.calls.push(TrackerCall::ResolveLabel {
            name: name.to_string(),
        });
        state
            .labels
            .iter()
            .find(|d| d.scope == scope && d.label.name == name)
            .map(|d| d.label.id.clone())
            .ok_or_else(|| Error::LabelNotFound {
                scope: scope.to_string(),
                name: name.to_string(),
            })
    }

    async fn get_or_create_label(&self, scope: &str, name: &str, color: &str) -> Result<LabelId> {
        let mut state = self.state.lock();
        state.calls.push(TrackerCall::GetOrCreateLabel {
            name: name.to_string(),
        });
        let exists = state
            .labels
            .iter()
            .any(|d| d.scope == scope && d.label.name == name);
        if !exists && state.refuse_creation {
            return Err(Error::Tracker(format!("cannot create label {name}")));
        }
        Ok(state.define(scope, name, Some(color)))
    }

    async fn list_items(&self, filter: &ListFilter) -> Result<Vec<WorkItem>> {
        let mut state = self.state.lock();
        state.calls.push(TrackerCall::ListItems {
            label: filter.label.clone(),
        });
        if state.failing_lists > 0 {
            state.failing_lists -= 1;
            return Err(Error::Tracker("list request failed".to_string()));
        }
        Ok(state
            .items
            .iter()
            .filter(|i| i.has_label_named(&filter.label))
            .filter(|i| {
                filter.project_ids.is_empty()
                    || i.project
                        .as_ref()
                        .is_some_and(|p| filter.project_ids.contains(p))
            })
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn add_label(&self, item: &ItemId, label: &LabelId) -> Result<()> {
        let mut state = self.state.lock();
        let label = state.label_by_id(label)?;
        state.calls.push(TrackerCall::AddLabel {
            item: item.clone(),
            label: label.name.clone(),
        });
        state.check_mutation(&label)?;
        let target = state.item_mut(item)?;
        if !target.labels.iter().any(|l| l.id == label.id) {
            target.labels.push(label);
        }
        Ok(())
    }

    async fn remove_label(&self, item: &ItemId, label: &LabelId) -> Result<()> {
        let mut state = self.state.lock();
        let label = state.label_by_id(label)?;
        state.calls.push(TrackerCall::RemoveLabel {
            item: item.clone(),
            label: label.name.clone(),
        });
        state.check_mutation(&label)?;
        let target = state.item_mut(item)?;
        target.labels.retain(|l| l.id != label.id);
        Ok(())
    }
}
