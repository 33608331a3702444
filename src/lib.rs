//! PoW Bench - proof-of-work mining benchmark in Rust
//!
//! This crate simulates a mining coordinator for benchmarking purposes:
//! - Splits the 32-bit nonce space across compute units
//! - Runs each unit on its own thread with a duty-cycled hash loop
//! - Supports RandomX and CryptoNight compute primitives
//! - Aggregates live statistics and produces a JSON report

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Compute units, primitives and the coordinator
pub mod miner;

/// Statistics aggregation and reporting
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::{BenchmarkConfig, Config};
pub use miner::{ComputePrimitive, Coordinator, InitSummary, UnitCommand, UnitEvent};
pub use stats::{AggregatedStats, BenchmarkReport, TimeSeries};
pub use types::{ComputeMode, UnitState, WorkerRuntimeState};
pub use utils::{MinerError, init_logging};
