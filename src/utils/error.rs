// src/utils/error.rs
use crate::miner::protocol::UnitCommand;
use serde_json;
use std::io;
use thiserror::Error;

/// Main error type for the benchmark application
///
/// Covers failures of individual compute units (initialization, hashing),
/// pool-level failures seen by the coordinator, and the usual I/O and
/// configuration errors of the surrounding application.
#[derive(Error, Debug)]
pub enum MinerError {
    /// A compute primitive or its seed could not be set up
    #[error("Initialization failed: {0}")]
    InitError(String),

    /// The hash loop failed while running
    #[error("Compute error: {0}")]
    ComputeError(String),

    /// A digest did not parse as a 256-bit hex number
    ///
    /// Units count and skip these; they never abort a session.
    #[error("Malformed digest: {0}")]
    MalformedDigest(String),

    /// Every compute unit failed to initialize
    #[error("All {total} compute units failed to initialize ({failed} errors)")]
    PoolFailure {
        /// Units that ended in `Error`
        failed: usize,
        /// Units in the pool
        total: usize,
    },

    /// A compute primitive was used after `release()`
    #[error("Compute primitive has been released")]
    ResourceReleased,

    /// An operation was requested in a lifecycle state that does not allow it
    #[error("Invalid state: {0}")]
    StateError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Async task execution errors
    #[error("Task execution error: {0}")]
    TaskError(String),
}

/// Converts a failed command send into MinerError
///
/// A send only fails once the unit's thread has exited, i.e. after it was
/// destroyed or panicked.
impl From<crossbeam_channel::SendError<UnitCommand>> for MinerError {
    fn from(e: crossbeam_channel::SendError<UnitCommand>) -> Self {
        MinerError::ChannelError(format!("Command send failed ({:?}): unit is gone", e.0))
    }
}

/// Converts async task join errors into MinerError
///
/// Used when joining unit threads from a blocking task fails.
impl From<tokio::task::JoinError> for MinerError {
    fn from(e: tokio::task::JoinError) -> Self {
        MinerError::TaskError(format!("Async task failed: {}", e))
    }
}
