//! Dispatch engine: polling loop, dedup, bounded pool, and status labels.

mod dedup;
mod gate;
pub mod labels;
pub mod poller;

pub use dedup::DispatchRecord;
pub use labels::{LabelNames, LabelRole, LabelStateMachine};
pub use poller::{
    Collaborators, DEFAULT_MAX_CONCURRENT, DEFAULT_POLL_INTERVAL, Lifecycle, Poller, PollerConfig,
};
