//! Error types for tracker-dispatch.

use thiserror::Error;

use crate::engine::Lifecycle;

#[derive(Debug, Error)]
pub enum Error {
    #[error("trigger label {name:?} could not be resolved in {scope}: {source}")]
    TriggerLabel {
        scope: String,
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("poller cannot start from state {state}")]
    AlreadyStarted { state: Lifecycle },

    #[error("label not found: {name:?} in {scope}")]
    LabelNotFound { scope: String, name: String },

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
