// src/stats/reporter.rs
use crate::types::{UnitState, WorkerRuntimeState};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use sysinfo::System;

/// One point of the hashrate history
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesSample {
    /// Milliseconds since the Unix epoch
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    /// Aggregate hashrate at that instant (H/s)
    pub hashrate: f64,
    /// Aggregate hash count at that instant
    pub total_hashes: u64,
}

/// Bounded hashrate history; the oldest sample is dropped once full
#[derive(Debug, Clone)]
pub struct TimeSeries {
    samples: VecDeque<TimeSeriesSample>,
    capacity: usize,
}

impl TimeSeries {
    /// Samples kept by default (five minutes at a 500 ms sampling period)
    pub const CAPACITY: usize = 600;

    /// Creates an empty history holding at most [`Self::CAPACITY`] samples
    pub fn new() -> Self {
        Self::with_capacity(Self::CAPACITY)
    }

    /// Creates an empty history holding at most `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        TimeSeries {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Appends a sample, evicting the oldest one when full
    pub fn push(&mut self, sample: TimeSeriesSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Drops every sample
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample has been recorded
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &TimeSeriesSample> {
        self.samples.iter()
    }

    /// Highest recorded hashrate, 0 when empty
    pub fn peak_hashrate(&self) -> f64 {
        self.samples.iter().map(|s| s.hashrate).fold(0.0, f64::max)
    }

    /// Mean recorded hashrate, 0 when empty
    pub fn avg_hashrate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.hashrate).sum::<f64>() / self.samples.len() as f64
    }

    /// Copies the history out, oldest first
    pub fn to_vec(&self) -> Vec<TimeSeriesSample> {
        self.samples.iter().copied().collect()
    }
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool-wide statistics derived from the unit table and the history
///
/// Always recomputed from scratch; nothing here is updated incrementally.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedStats {
    /// Sum of the units' session hash counts
    pub total_hashes: u64,
    /// Sum of the last reported hashrates of Running units (H/s)
    pub current_hashrate: f64,
    /// Highest sampled aggregate hashrate (H/s)
    pub peak_hashrate: f64,
    /// Mean sampled aggregate hashrate (H/s)
    pub avg_hashrate: f64,
    /// Units currently Running
    pub running_workers: usize,
    /// Units in Error
    pub errored_workers: usize,
    /// Units in the pool
    pub total_workers: usize,
    /// Sum of solutions found
    pub total_solutions: u64,
    /// Sum of seed rotations
    pub total_cache_reinits: u64,
    /// Seconds since START
    pub elapsed_secs: f64,
}

impl AggregatedStats {
    /// Aggregates the unit table
    ///
    /// # Arguments
    /// * `workers` - Last known state of every unit
    /// * `history` - Sampled hashrates for peak and average
    /// * `elapsed` - Time since the benchmark started
    pub fn compute(workers: &[WorkerRuntimeState], history: &TimeSeries, elapsed: Duration) -> Self {
        let running = workers
            .iter()
            .filter(|w| w.state == UnitState::Running);

        AggregatedStats {
            total_hashes: workers.iter().map(|w| w.total_hashes).sum(),
            current_hashrate: running.clone().map(|w| w.last_hashrate).sum(),
            peak_hashrate: history.peak_hashrate(),
            avg_hashrate: history.avg_hashrate(),
            running_workers: running.count(),
            errored_workers: workers
                .iter()
                .filter(|w| w.state == UnitState::Error)
                .count(),
            total_workers: workers.len(),
            total_solutions: workers.iter().map(|w| w.solutions_found).sum(),
            total_cache_reinits: workers.iter().map(|w| w.cache_reinit_count).sum(),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}

/// Host load sampler for the periodic stats line
pub struct HardwareMonitor {
    system: System,
}

impl HardwareMonitor {
    /// Creates a monitor with CPU and memory data loaded
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();
        HardwareMonitor { system }
    }

    /// Average CPU usage across cores since the previous call (0-100)
    pub fn cpu_usage(&mut self) -> f32 {
        self.system.refresh_cpu_all();
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return 0.0;
        }
        cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
    }

    /// Memory in use on the host, in MB
    pub fn memory_used_mb(&mut self) -> u64 {
        self.system.refresh_memory();
        self.system.used_memory() / (1024 * 1024)
    }
}

impl Default for HardwareMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64, hashrate: f64) -> TimeSeriesSample {
        TimeSeriesSample {
            timestamp_ms: ts,
            hashrate,
            total_hashes: ts,
        }
    }

    fn worker(id: usize, state: UnitState, hashes: u64, rate: f64) -> WorkerRuntimeState {
        WorkerRuntimeState {
            state,
            total_hashes: hashes,
            last_hashrate: rate,
            solutions_found: 1,
            cache_reinit_count: 2,
            ..WorkerRuntimeState::new(id)
        }
    }

    #[test]
    fn ring_buffer_drops_oldest() {
        let mut series = TimeSeries::new();
        for i in 0..(TimeSeries::CAPACITY as u64 + 25) {
            series.push(sample(i, 1.0));
        }
        assert_eq!(series.len(), TimeSeries::CAPACITY);
        assert_eq!(series.iter().next().unwrap().timestamp_ms, 25);
        assert_eq!(
            series.iter().last().unwrap().timestamp_ms,
            TimeSeries::CAPACITY as u64 + 24
        );
    }

    #[test]
    fn peak_and_average_over_samples() {
        let mut series = TimeSeries::with_capacity(3);
        assert_eq!(series.peak_hashrate(), 0.0);
        assert_eq!(series.avg_hashrate(), 0.0);

        series.push(sample(1, 10.0));
        series.push(sample(2, 30.0));
        series.push(sample(3, 20.0));
        series.push(sample(4, 40.0));
        assert_eq!(series.peak_hashrate(), 40.0);
        assert!((series.avg_hashrate() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn aggregation_counts_by_state() {
        let workers = vec![
            worker(0, UnitState::Running, 100, 5.0),
            worker(1, UnitState::Running, 50, 2.5),
            worker(2, UnitState::Error, 7, 9.0),
            worker(3, UnitState::Stopped, 3, 1.0),
        ];
        let mut history = TimeSeries::new();
        history.push(sample(1, 4.0));
        history.push(sample(2, 8.0));

        let stats = AggregatedStats::compute(&workers, &history, Duration::from_millis(2500));
        assert_eq!(stats.total_hashes, 160);
        assert!((stats.current_hashrate - 7.5).abs() < 1e-9);
        assert_eq!(stats.peak_hashrate, 8.0);
        assert!((stats.avg_hashrate - 6.0).abs() < 1e-9);
        assert_eq!(stats.running_workers, 2);
        assert_eq!(stats.errored_workers, 1);
        assert_eq!(stats.total_workers, 4);
        assert_eq!(stats.total_solutions, 4);
        assert_eq!(stats.total_cache_reinits, 8);
        assert!((stats.elapsed_secs - 2.5).abs() < 1e-9);
    }

    #[test]
    fn sample_serializes_with_report_names() {
        let json = serde_json::to_value(sample(1700, 3.5)).unwrap();
        assert_eq!(json["timestamp"], 1700);
        assert_eq!(json["hashrate"], 3.5);
        assert_eq!(json["totalHashes"], 1700);
    }
}
