//! cardwright - spreadsheet test cases to tracker tickets.
//!
//! This library provides the core functionality for the `cw` CLI tool:
//! creating and updating one ticket per test case, logging manual execution
//! results, filing defects for failures, and attaching screenshot evidence.

pub mod card;
pub mod cli;
pub mod commands;
pub mod config;
pub mod directory;
pub mod evidence;
pub mod execution;
pub mod logging;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod retry;
pub mod sheet;
pub mod tracker;

/// Library-level error type for cardwright operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Spreadsheet error: {0}")]
    Sheet(String),

    #[error("Tracker error: {0}")]
    Tracker(#[from] tracker::TrackerError),

    #[error("Notification error: {0}")]
    Notify(#[from] notify::NotifyError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for cardwright operations.
pub type Result<T> = std::result::Result<T, Error>;
