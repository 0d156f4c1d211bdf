//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The database URL is wrapped in `secrecy::SecretString` so it never lands
//! in logs.

pub mod poller;

pub use poller::PollerSettings;

use crate::error::{Error, Result};
use secrecy::SecretString;

/// Ledger namespace used when `LEDGER_ADAPTER` is unset.
pub const DEFAULT_LEDGER_ADAPTER: &str = "linear";

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Namespace for this tracker's rows in the shared ledger table.
    pub ledger_adapter: String,
    pub poller: PollerSettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            ledger_adapter: optional_var("LEDGER_ADAPTER")
                .unwrap_or_else(|| DEFAULT_LEDGER_ADAPTER.to_string()),
            poller: PollerSettings::from_env()?,
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

/// An unset or blank variable reads as `None`.
pub(crate) fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_var(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| Error::Config(format!("invalid value for {name}: {e}")))
        })
        .transpose()
}
