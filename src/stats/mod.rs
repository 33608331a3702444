//! Statistics collection and reporting module
//!
//! This module turns per-unit STATS into pool-wide numbers:
//! - Aggregation of hash counts, hashrates and unit health
//! - A bounded hashrate history
//! - Host probing for the periodic stats line and the final report
//!
//! The coordinator owns all of it; nothing here is shared across threads.

/// Aggregation and hashrate history
///
/// Contains [`AggregatedStats`], the [`TimeSeries`] ring buffer and the
/// [`HardwareMonitor`] used for the live stats line.
pub mod reporter;

/// Final JSON report
pub mod report;

// Re-export main components
pub use report::{BenchmarkReport, DeviceInfo, WorkerReport};
pub use reporter::{AggregatedStats, HardwareMonitor, TimeSeries, TimeSeriesSample};
