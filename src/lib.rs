//! # tracker-dispatch
//!
//! Turns labeled issue-tracker work items into executed tasks.
//!
//! A [`engine::Poller`] scans the tracker for items carrying a trigger label,
//! dispatches each one at most once (backed by an optional durable
//! [`ledger::ProcessedLedger`]), runs them on a bounded pool through an injected
//! [`executor::Executor`], and mirrors the outcome back onto the tracker as
//! status labels.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod telemetry;
pub mod tracker;
