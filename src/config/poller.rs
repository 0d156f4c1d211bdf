//! Poller settings from a TOML file or the environment.
//!
//! ```toml
//! [poller]
//! team = "ENG"
//! label = "pilot"
//! projects = ["mobile"]
//! interval_secs = 30
//! max_concurrent = 2
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{optional_var, parsed_var};
use crate::engine::{DEFAULT_MAX_CONCURRENT, DEFAULT_POLL_INTERVAL, LabelNames, PollerConfig};
use crate::error::{Error, Result};
use crate::tracker::{DEFAULT_PAGE_SIZE, DEFAULT_STATUS_TYPES};

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct SettingsFile {
    poller: PollerSettings,
}

/// Raw, unvalidated poller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    /// Team or workspace key. Required before a poller can be built.
    pub team: Option<String>,
    /// Trigger label name.
    pub label: String,
    pub status_labels: Option<StatusLabelNames>,
    pub projects: Vec<String>,
    pub status_types: Vec<String>,
    pub page_size: usize,
    pub interval_secs: u64,
    pub max_concurrent: usize,
}

/// Overrides for the status label names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLabelNames {
    pub in_progress: String,
    pub done: String,
    pub failed: String,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            team: None,
            label: LabelNames::default().trigger,
            status_labels: None,
            projects: Vec::new(),
            status_types: DEFAULT_STATUS_TYPES.iter().map(|s| s.to_string()).collect(),
            page_size: DEFAULT_PAGE_SIZE,
            interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl PollerSettings {
    /// Read `TRACKER_TEAM`, `TRIGGER_LABEL`, `TRACKER_PROJECTS` (comma
    /// separated), `POLL_INTERVAL_SECS`, and `MAX_CONCURRENT`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            team: optional_var("TRACKER_TEAM"),
            label: optional_var("TRIGGER_LABEL").unwrap_or(defaults.label),
            projects: optional_var("TRACKER_PROJECTS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            interval_secs: parsed_var("POLL_INTERVAL_SECS")?.unwrap_or(defaults.interval_secs),
            max_concurrent: parsed_var("MAX_CONCURRENT")?.unwrap_or(defaults.max_concurrent),
            ..defaults
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: SettingsFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad poller settings: {e}")))?;
        Ok(file.poller)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read poller settings {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Build a validated [`PollerConfig`].
    pub fn to_poller_config(&self) -> Result<PollerConfig> {
        let team = self
            .team
            .clone()
            .ok_or_else(|| Error::Config("poller team is not set".to_string()))?;

        let mut labels = LabelNames {
            trigger: self.label.clone(),
            ..LabelNames::default()
        };
        if let Some(ref status) = self.status_labels {
            labels.in_progress = status.in_progress.clone();
            labels.done = status.done.clone();
            labels.failed = status.failed.clone();
        }

        PollerConfig {
            scope: team,
            labels,
            project_ids: self.projects.clone(),
            status_types: self.status_types.clone(),
            page_size: self.page_size,
            poll_interval: Duration::from_secs(self.interval_secs),
            max_concurrent: self.max_concurrent,
        }
        .validate()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
