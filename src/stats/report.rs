// src/stats/report.rs
//! Final benchmark report
//!
//! Assembled once when a run stops and never modified afterwards.

use crate::config::BenchmarkConfig;
use crate::stats::reporter::{AggregatedStats, TimeSeries, TimeSeriesSample};
use crate::types::{UnitState, WorkerRuntimeState};
use crate::utils::error::MinerError;
use serde::Serialize;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use sysinfo::System;

/// Host the benchmark ran on
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Program name, version and platform
    pub user_agent: String,
    /// Logical CPUs
    pub hardware_concurrency: usize,
    /// Installed memory in GB, when it can be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
}

impl DeviceInfo {
    /// Detects the current host
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let total_bytes = system.total_memory();

        DeviceInfo {
            user_agent: format!(
                "{}/{} ({}; {})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
            hardware_concurrency: num_cpus::get(),
            memory: (total_bytes > 0).then(|| total_bytes / (1024 * 1024 * 1024)),
        }
    }
}

/// Final state of one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReport {
    /// Unit index
    pub worker_id: usize,
    /// Hashes of the last session
    pub total_hashes: u64,
    /// State when the report was taken
    pub final_state: UnitState,
    /// Digests that did not parse as hex
    pub malformed_digests: u64,
    /// Failure message, for units that ended in Error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&WorkerRuntimeState> for WorkerReport {
    fn from(worker: &WorkerRuntimeState) -> Self {
        WorkerReport {
            worker_id: worker.id,
            total_hashes: worker.total_hashes,
            final_state: worker.state,
            malformed_digests: worker.malformed_digests,
            error: worker.error.clone(),
        }
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    /// Milliseconds since the Unix epoch when the report was taken
    pub timestamp: u64,
    /// Parameters of the run
    pub config: BenchmarkConfig,
    /// Host description
    pub device_info: DeviceInfo,
    /// Final aggregation
    pub stats: AggregatedStats,
    /// Sampled hashrate history, oldest first
    pub time_series_data: Vec<TimeSeriesSample>,
    /// Per-unit outcome
    pub worker_data: Vec<WorkerReport>,
}

impl BenchmarkReport {
    /// Snapshots the coordinator's state
    pub fn new(
        config: &BenchmarkConfig,
        stats: &AggregatedStats,
        history: &TimeSeries,
        workers: &[WorkerRuntimeState],
    ) -> Self {
        BenchmarkReport {
            timestamp: unix_millis(),
            config: config.clone(),
            device_info: DeviceInfo::detect(),
            stats: stats.clone(),
            time_series_data: history.to_vec(),
            worker_data: workers.iter().map(WorkerReport::from).collect(),
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, MinerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the report as JSON to `path`
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), MinerError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_report() -> BenchmarkReport {
        let mut failed = WorkerRuntimeState::new(1);
        failed.state = UnitState::Error;
        failed.error = Some("Initialization failed: out of memory".into());

        let mut stopped = WorkerRuntimeState::new(0);
        stopped.state = UnitState::Stopped;
        stopped.total_hashes = 1234;
        stopped.malformed_digests = 7;

        let workers = vec![stopped, failed];
        let mut history = TimeSeries::new();
        history.push(TimeSeriesSample {
            timestamp_ms: 1,
            hashrate: 10.0,
            total_hashes: 5,
        });
        let stats = AggregatedStats::compute(&workers, &history, Duration::from_secs(1));

        BenchmarkReport::new(&BenchmarkConfig::default(), &stats, &history, &workers)
    }

    #[test]
    fn report_uses_camel_case_names() {
        let json = serde_json::to_value(sample_report()).unwrap();

        assert!(json["timestamp"].as_u64().unwrap() > 0);
        assert_eq!(json["config"]["throttle_pct"], 20);
        assert!(json["deviceInfo"]["hardwareConcurrency"].as_u64().unwrap() >= 1);
        assert!(
            json["deviceInfo"]["userAgent"]
                .as_str()
                .unwrap()
                .starts_with("pow_bench-rs/")
        );
        assert_eq!(json["stats"]["totalHashes"], 1234);
        assert_eq!(json["stats"]["erroredWorkers"], 1);
        assert_eq!(json["timeSeriesData"][0]["totalHashes"], 5);

        let workers = json["workerData"].as_array().unwrap();
        assert_eq!(workers[0]["workerId"], 0);
        assert_eq!(workers[0]["finalState"], "stopped");
        assert_eq!(workers[0]["malformedDigests"], 7);
        assert!(workers[0].get("error").is_none());
        assert_eq!(workers[1]["finalState"], "error");
        assert!(workers[1]["error"].as_str().unwrap().contains("out of memory"));
    }

    #[test]
    fn write_json_creates_the_file() {
        let path = std::env::temp_dir().join(format!("pow-bench-report-{}.json", unix_millis()));
        let report = sample_report();
        report.write_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["workerData"].as_array().unwrap().len(), 2);
        std::fs::remove_file(&path).unwrap();
    }
}
