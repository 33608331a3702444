// src/miner/coordinator.rs
//! Benchmark coordinator
//!
//! Owns the pool of compute units and the table of their last known state.
//! Every write to that table happens on the coordinator's own `&mut self`
//! path, driven by unit events, the 500 ms sampler and the run deadline.

use crate::config::Config;
use crate::miner::algorithm::{self, PrimitiveFactory};
use crate::miner::protocol::{UnitCommand, UnitEvent};
use crate::miner::throttle::MAX_THROTTLE;
use crate::miner::worker::UnitHandle;
use crate::stats::report::unix_millis;
use crate::stats::{AggregatedStats, BenchmarkReport, TimeSeries, TimeSeriesSample};
use crate::types::{UnitState, WorkerRuntimeState};
use crate::utils::error::MinerError;
use std::collections::HashSet;
use std::future::{self, Future};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Period of the aggregation sampler
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(500);

/// How long STOP and DESTROY acknowledgements are awaited
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of [`Coordinator::initialize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitSummary {
    /// Units that reached Ready
    pub ready: usize,
    /// Units that ended in Error
    pub failed: usize,
}

impl InitSummary {
    /// Some, but not all, units failed
    pub fn is_partial_failure(&self) -> bool {
        self.failed > 0 && self.ready > 0
    }
}

/// Called after every aggregation pass
pub type StatsCallback = Box<dyn FnMut(&AggregatedStats) + Send>;

/// Called once the run deadline has stopped the pool
pub type CompleteCallback = Box<dyn FnMut(&BenchmarkReport) + Send>;

enum Wake {
    Event(UnitEvent),
    Sample,
    Deadline,
    Shutdown,
}

/// Drives a pool of compute units through one or more benchmark runs
pub struct Coordinator {
    config: Config,
    factory: PrimitiveFactory,

    units: Vec<UnitHandle>,
    workers: Vec<WorkerRuntimeState>,
    /// Failed units that were sent DESTROY outside `terminate` and confirmed it
    retired: HashSet<usize>,
    terminating: bool,
    events_tx: UnboundedSender<UnitEvent>,
    events_rx: UnboundedReceiver<UnitEvent>,

    history: TimeSeries,
    stats: AggregatedStats,

    /// Armed by `start`, cleared by `stop`
    sampler: Option<Interval>,
    deadline: Option<Instant>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,

    on_stats: Option<StatsCallback>,
    on_complete: Option<CompleteCallback>,
}

impl Coordinator {
    /// Creates a coordinator backed by the real compute primitives
    ///
    /// # Errors
    /// `ConfigError` if the benchmark parameters are out of range.
    pub fn new(config: Config) -> Result<Self, MinerError> {
        Self::with_factory(config, algorithm::default_factory())
    }

    /// Creates a coordinator whose units build primitives with `factory`
    pub fn with_factory(config: Config, factory: PrimitiveFactory) -> Result<Self, MinerError> {
        config.benchmark.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Coordinator {
            config,
            factory,
            units: Vec::new(),
            workers: Vec::new(),
            retired: HashSet::new(),
            terminating: false,
            events_tx,
            events_rx,
            history: TimeSeries::new(),
            stats: AggregatedStats::default(),
            sampler: None,
            deadline: None,
            started_at: None,
            stopped_at: None,
            on_stats: None,
            on_complete: None,
        })
    }

    /// Registers the aggregation callback
    pub fn set_on_stats<F>(&mut self, callback: F)
    where
        F: FnMut(&AggregatedStats) + Send + 'static,
    {
        self.on_stats = Some(Box::new(callback));
    }

    /// Registers the completion callback
    pub fn set_on_complete<F>(&mut self, callback: F)
    where
        F: FnMut(&BenchmarkReport) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Last known state of every unit
    pub fn workers(&self) -> &[WorkerRuntimeState] {
        &self.workers
    }

    /// Result of the latest aggregation pass
    pub fn stats(&self) -> &AggregatedStats {
        &self.stats
    }

    /// Sampled hashrate history of the current or last run
    pub fn history(&self) -> &TimeSeries {
        &self.history
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.sampler.is_some()
    }

    /// Spawns the units and waits until each is Ready or Error
    ///
    /// Partial failure is not an error: the summary says how many units
    /// survived. Units still initializing when `init_timeout_secs` runs out
    /// are marked Error.
    pub async fn initialize(&mut self) -> Result<InitSummary, MinerError> {
        if !self.units.is_empty() {
            return Err(MinerError::StateError("pool is already initialized".into()));
        }

        let total = self.config.benchmark.threads;
        let mode = self.config.benchmark.mode;
        log::info!("Initializing {} compute units ({})", total, mode);

        for id in 0..total {
            let unit = UnitHandle::spawn(id, self.factory.clone(), self.events_tx.clone())?;
            unit.send(UnitCommand::Init {
                unit_id: id,
                total_units: total,
                mode,
            })?;

            let mut worker = WorkerRuntimeState::new(id);
            worker.state = UnitState::Initializing;
            self.workers.push(worker);
            self.units.push(unit);
        }

        let settled = |s: UnitState| matches!(s, UnitState::Ready | UnitState::Error);
        if !self.settle(self.config.init_timeout(), settled).await {
            self.fail_unsettled(settled, "initialization timed out");
        }

        let ready = self.count(UnitState::Ready);
        let failed = self.count(UnitState::Error);
        if failed == total {
            log::error!("All {} compute units failed to initialize", total);
        } else if failed > 0 {
            log::warn!(
                "{} of {} compute units failed to initialize, continuing with {}",
                failed,
                total,
                ready
            );
        } else {
            log::info!("All {} compute units ready", total);
        }

        Ok(InitSummary { ready, failed })
    }

    /// Starts every Ready (or previously Stopped) unit
    ///
    /// # Errors
    /// `PoolFailure` when no unit can run, `StateError` when the pool was
    /// never initialized or a run is already in progress.
    pub fn start(&mut self) -> Result<(), MinerError> {
        if self.units.is_empty() {
            return Err(MinerError::StateError("pool is not initialized".into()));
        }
        if self.is_running() {
            return Err(MinerError::StateError("benchmark is already running".into()));
        }

        let startable: Vec<usize> = self
            .workers
            .iter()
            .filter(|w| matches!(w.state, UnitState::Ready | UnitState::Stopped))
            .map(|w| w.id)
            .collect();
        if startable.is_empty() {
            return Err(MinerError::PoolFailure {
                failed: self.count(UnitState::Error),
                total: self.workers.len(),
            });
        }

        let throttle = self.config.benchmark.throttle_pct;
        let stats_interval = self.config.benchmark.stats_interval_ms;
        for id in startable.iter().copied() {
            self.units[id].send(UnitCommand::Start {
                throttle,
                stats_interval,
            })?;
            let worker = &mut self.workers[id];
            worker.state = UnitState::Running;
            worker.total_hashes = 0;
            worker.last_hashrate = 0.0;
        }

        self.history.clear();
        let now = Instant::now();
        self.started_at = Some(now);
        self.stopped_at = None;

        let mut sampler = time::interval_at(now + SAMPLE_PERIOD, SAMPLE_PERIOD);
        sampler.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.sampler = Some(sampler);
        self.deadline = self.config.benchmark.duration().map(|d| now + d);

        log::info!(
            "Benchmark started on {} units (throttle {}%, {})",
            startable.len(),
            throttle,
            match self.config.benchmark.duration() {
                Some(d) => format!("{} s", d.as_secs()),
                None => "until interrupted".into(),
            }
        );
        Ok(())
    }

    /// Dispatches events until the run ends
    ///
    /// The run ends at the deadline (which also fires the completion
    /// callback), when `shutdown` resolves, or when every unit has failed.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<BenchmarkReport, MinerError>
    where
        F: Future<Output = ()>,
    {
        if !self.is_running() {
            return Err(MinerError::StateError("benchmark is not running".into()));
        }
        tokio::pin!(shutdown);

        loop {
            let wake = tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(event) => Wake::Event(event),
                    None => Wake::Shutdown,
                },
                _ = next_tick(&mut self.sampler) => Wake::Sample,
                _ = until(self.deadline) => Wake::Deadline,
                _ = &mut shutdown => Wake::Shutdown,
            };

            match wake {
                Wake::Event(event) => {
                    self.handle_event(event);
                    if self.all_failed() {
                        log::error!("Every compute unit has failed, stopping the benchmark");
                        return self.stop().await;
                    }
                }
                Wake::Sample => self.sample(),
                Wake::Deadline => {
                    log::info!("Benchmark duration reached");
                    let report = self.stop().await?;
                    if let Some(callback) = self.on_complete.as_mut() {
                        callback(&report);
                    }
                    return Ok(report);
                }
                Wake::Shutdown => {
                    log::info!("Shutdown requested, stopping the benchmark");
                    return self.stop().await;
                }
            }
        }
    }

    /// Stops every Running unit and snapshots the run
    ///
    /// Units that do not acknowledge within the timeout are marked Error.
    pub async fn stop(&mut self) -> Result<BenchmarkReport, MinerError> {
        self.sampler = None;
        self.deadline = None;
        if self.started_at.is_some() && self.stopped_at.is_none() {
            self.stopped_at = Some(Instant::now());
        }

        for (unit, worker) in self.units.iter().zip(self.workers.iter_mut()) {
            if worker.state == UnitState::Running {
                if let Err(err) = unit.send(UnitCommand::Stop) {
                    worker.state = UnitState::Error;
                    worker.error = Some(err.to_string());
                }
            }
        }

        let stopped = |s: UnitState| s != UnitState::Running;
        if !self.settle(ACK_TIMEOUT, stopped).await {
            self.fail_unsettled(stopped, "unit did not acknowledge STOP");
        }

        let stats = AggregatedStats::compute(&self.workers, &self.history, self.elapsed());
        self.publish(stats);

        log::info!(
            "Benchmark stopped: {} hashes in {:.1} s (avg {:.2} H/s, peak {:.2} H/s, {} solutions)",
            self.stats.total_hashes,
            self.stats.elapsed_secs,
            self.stats.avg_hashrate,
            self.stats.peak_hashrate,
            self.stats.total_solutions
        );

        Ok(BenchmarkReport::new(
            &self.config.benchmark,
            &self.stats,
            &self.history,
            &self.workers,
        ))
    }

    /// Stops, destroys and joins every unit, then empties the pool
    pub async fn terminate(&mut self) -> Result<(), MinerError> {
        if self.is_running() {
            self.stop().await?;
        }

        self.terminating = true;
        for (unit, worker) in self.units.iter().zip(self.workers.iter_mut()) {
            if worker.state == UnitState::Destroyed {
                continue;
            }
            if self.retired.contains(&worker.id) || unit.send(UnitCommand::Destroy).is_err() {
                log::debug!("unit {} already exited", unit.id());
                worker.state = UnitState::Destroyed;
            }
        }

        let destroyed = |s: UnitState| s == UnitState::Destroyed;
        let settled = self.settle(ACK_TIMEOUT, destroyed).await;
        self.terminating = false;
        if !settled {
            log::warn!(
                "{} units did not acknowledge DESTROY",
                self.workers.iter().filter(|w| !destroyed(w.state)).count()
            );
        }

        // Units that never answered are detached; dropping their handle
        // closes their command channel.
        let mut threads = Vec::new();
        for (unit, worker) in self.units.iter_mut().zip(self.workers.iter()) {
            if destroyed(worker.state) {
                threads.extend(unit.take_thread());
            }
        }
        tokio::task::spawn_blocking(move || {
            for thread in threads {
                if thread.join().is_err() {
                    log::warn!("A unit thread panicked during shutdown");
                }
            }
        })
        .await?;

        self.units.clear();
        self.workers.clear();
        self.retired.clear();
        self.history.clear();
        self.started_at = None;
        self.stopped_at = None;
        log::info!("Compute pool terminated");
        Ok(())
    }

    /// Changes the throttle of the current and future runs
    ///
    /// # Errors
    /// `InputError` above 90 %.
    pub fn update_throttle(&mut self, throttle_pct: u8) -> Result<(), MinerError> {
        if throttle_pct > MAX_THROTTLE {
            return Err(MinerError::InputError(format!(
                "throttle must be between 0 and {}, got {}",
                MAX_THROTTLE, throttle_pct
            )));
        }
        self.config.benchmark.throttle_pct = throttle_pct;

        for (unit, worker) in self.units.iter().zip(self.workers.iter()) {
            if worker.state == UnitState::Running {
                if let Err(err) = unit.send(UnitCommand::UpdateConfig {
                    throttle: throttle_pct,
                }) {
                    log::warn!("unit {}: {}", unit.id(), err);
                }
            }
        }
        log::info!("Throttle set to {}%", throttle_pct);
        Ok(())
    }

    fn handle_event(&mut self, event: UnitEvent) {
        let unit_id = event.unit_id();
        let Some(worker) = self.workers.get_mut(unit_id) else {
            log::warn!("Event from unknown unit {}", unit_id);
            return;
        };

        match event {
            UnitEvent::InitProgress {
                progress, message, ..
            } => {
                log::debug!("unit {}: {}% {}", unit_id, progress, message);
            }
            UnitEvent::Ready { capabilities, .. } => {
                // A unit already failed on timeout stays failed
                if worker.state != UnitState::Initializing {
                    log::debug!("unit {}: late READY ignored while {}", unit_id, worker.state);
                    return;
                }
                worker.state = UnitState::Ready;
                worker.memory_mb = capabilities.memory_mb;
                worker.backend = Some(capabilities.backend);
                worker.error = None;
            }
            UnitEvent::Stats(stats) => {
                if worker.state != UnitState::Running {
                    log::debug!("unit {}: STATS ignored while {}", unit_id, worker.state);
                    return;
                }
                // Late STATS from an earlier session must not lower the count
                worker.total_hashes = worker.total_hashes.max(stats.total_hashes);
                worker.last_hashrate = stats.hashrate;
                worker.duty_cycle = stats.duty_cycle;
                worker.solutions_found = stats.solutions_found;
                worker.cache_reinit_count = stats.cache_reinit_count;
                worker.malformed_digests = stats.malformed_digests;
            }
            UnitEvent::Error { error, details, .. } => {
                log::error!("unit {} failed: {}", unit_id, error);
                if let Some(details) = details {
                    log::debug!("unit {} failure context: {}", unit_id, details);
                }
                worker.state = UnitState::Error;
                worker.last_hashrate = 0.0;
                // Keep the first recorded cause
                if worker.error.is_none() {
                    worker.error = Some(error);
                }
            }
            UnitEvent::Stopped { total_hashes, .. } => {
                if worker.state != UnitState::Running {
                    log::debug!("unit {}: STOPPED ignored while {}", unit_id, worker.state);
                    return;
                }
                worker.state = UnitState::Stopped;
                worker.total_hashes = worker.total_hashes.max(total_hashes);
                worker.last_hashrate = 0.0;
            }
            UnitEvent::Destroyed { .. } => {
                worker.last_hashrate = 0.0;
                if worker.state == UnitState::Error && !self.terminating {
                    // Retired after a timeout; the report keeps the failure
                    self.retired.insert(unit_id);
                } else {
                    worker.state = UnitState::Destroyed;
                }
            }
        }
    }

    /// Consumes events until every unit satisfies `done` or `limit` passes
    async fn settle<F>(&mut self, limit: Duration, done: F) -> bool
    where
        F: Fn(UnitState) -> bool,
    {
        let deadline = Instant::now() + limit;
        while !self.workers.iter().all(|w| done(w.state)) {
            match time::timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some(event)) => self.handle_event(event),
                Ok(None) | Err(_) => return false,
            }
        }
        true
    }

    /// Marks units that missed `done` as failed and tells them to release
    fn fail_unsettled<F>(&mut self, done: F, reason: &str)
    where
        F: Fn(UnitState) -> bool,
    {
        for (unit, worker) in self.units.iter().zip(self.workers.iter_mut()) {
            if done(worker.state) {
                continue;
            }
            log::error!("unit {}: {}", worker.id, reason);
            worker.state = UnitState::Error;
            worker.last_hashrate = 0.0;
            worker.error = Some(reason.to_string());
            // Handled once the unit is responsive again
            if unit.send(UnitCommand::Destroy).is_err() {
                log::debug!("unit {} already exited", worker.id);
            }
        }
    }

    fn sample(&mut self) {
        let mut stats = AggregatedStats::compute(&self.workers, &self.history, self.elapsed());
        self.history.push(TimeSeriesSample {
            timestamp_ms: unix_millis(),
            hashrate: stats.current_hashrate,
            total_hashes: stats.total_hashes,
        });
        stats.peak_hashrate = self.history.peak_hashrate();
        stats.avg_hashrate = self.history.avg_hashrate();
        self.publish(stats);
    }

    fn publish(&mut self, stats: AggregatedStats) {
        self.stats = stats;
        if let Some(callback) = self.on_stats.as_mut() {
            callback(&self.stats);
        }
    }

    fn elapsed(&self) -> Duration {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => stop.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    fn count(&self, state: UnitState) -> usize {
        self.workers.iter().filter(|w| w.state == state).count()
    }

    fn all_failed(&self) -> bool {
        !self.workers.is_empty() && self.count(UnitState::Error) == self.workers.len()
    }
}

async fn next_tick(sampler: &mut Option<Interval>) {
    match sampler {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
