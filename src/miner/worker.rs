// src/miner/worker.rs
//! Compute unit implementation
//!
//! Every unit runs on a dedicated OS thread and owns everything it touches:
//! its compute primitive, block template, nonce range and counters. The
//! coordinator talks to it only through [`UnitCommand`]s and hears back only
//! through [`UnitEvent`]s.
//!
//! While running, a unit alternates between a hashing phase and a sleep
//! phase as dictated by its [`DutyCycle`]. The sleep phase is also where the
//! command channel is read, so STOP is honored at cycle boundaries and never
//! interrupts a digest in flight.

use crate::miner::algorithm::{self, ComputePrimitive, DIFFICULTY_TARGET, PrimitiveFactory};
use crate::miner::partition::{self, NonceRange};
use crate::miner::protocol::{Capabilities, UnitCommand, UnitEvent, UnitStats};
use crate::miner::template::{self, BlockTemplate};
use crate::miner::throttle::{DutyCycle, MAX_THROTTLE};
use crate::types::{ComputeMode, UnitState};
use crate::utils::error::MinerError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rand::RngCore;
use rand::rngs::OsRng;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

/// Running time after which a unit re-seeds its primitive
pub const CACHE_ROTATION_INTERVAL: Duration = Duration::from_millis(120_000);

/// Coordinator-side handle to a unit thread
pub struct UnitHandle {
    id: usize,
    commands: Sender<UnitCommand>,
    thread: Option<JoinHandle<()>>,
}

impl UnitHandle {
    /// Spawns unit `id` on its own thread
    ///
    /// # Arguments
    /// * `id` - Unit index
    /// * `factory` - Builds the unit's private compute primitive on INIT
    /// * `events` - Channel all of the unit's events are written to
    pub fn spawn(
        id: usize,
        factory: PrimitiveFactory,
        events: UnboundedSender<UnitEvent>,
    ) -> Result<Self, MinerError> {
        Self::spawn_with(id, factory, events, CACHE_ROTATION_INTERVAL)
    }

    pub(crate) fn spawn_with(
        id: usize,
        factory: PrimitiveFactory,
        events: UnboundedSender<UnitEvent>,
        rotation_interval: Duration,
    ) -> Result<Self, MinerError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let panic_events = events.clone();

        let thread = thread::Builder::new()
            .name(format!("unit-{}", id))
            .spawn(move || {
                let worker = WorkerLoop::new(id, factory, rx, events, rotation_interval);
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| worker.run())) {
                    let message = panic_message(payload.as_ref());
                    log::error!("unit {} panicked: {}", id, message);
                    let _ = panic_events.send(UnitEvent::Error {
                        unit_id: id,
                        error: format!("compute unit panicked: {}", message),
                        details: None,
                    });
                }
            })?;

        Ok(UnitHandle {
            id,
            commands: tx,
            thread: Some(thread),
        })
    }

    /// Unit index
    pub fn id(&self) -> usize {
        self.id
    }

    /// Queues a command for the unit
    ///
    /// # Errors
    /// `ChannelError` once the unit thread has exited.
    pub fn send(&self, command: UnitCommand) -> Result<(), MinerError> {
        self.commands.send(command)?;
        Ok(())
    }

    /// Takes the thread handle so the caller can join it
    pub fn take_thread(&mut self) -> Option<JoinHandle<()>> {
        self.thread.take()
    }
}

enum Flow {
    Continue,
    Exit,
}

/// A unit failure and the place it was first observed
#[derive(Debug)]
struct Failure {
    error: MinerError,
    origin: String,
    backtrace: Backtrace,
}

impl Failure {
    /// Captures the stack at the call site, i.e. where the error surfaced
    fn new(error: MinerError, origin: impl Into<String>) -> Self {
        Failure {
            error,
            origin: origin.into(),
            backtrace: Backtrace::capture(),
        }
    }

    /// Origin line, followed by the stack when `RUST_BACKTRACE` is set
    fn details(&self) -> String {
        match self.backtrace.status() {
            BacktraceStatus::Captured => format!("{}\n{}", self.origin, self.backtrace),
            _ => self.origin.clone(),
        }
    }
}

/// Wall-clock time spent in each duty-cycle phase since START
#[derive(Debug, Default, Clone, Copy)]
struct PhaseTime {
    work: Duration,
    sleep: Duration,
}

impl PhaseTime {
    /// Measured share of hashing time, in percent
    fn duty_percent(&self) -> f64 {
        let total = (self.work + self.sleep).as_secs_f64();
        if total > 0.0 {
            self.work.as_secs_f64() / total * 100.0
        } else {
            0.0
        }
    }
}

/// Timers of one START..STOP session
struct Session {
    last_report: Instant,
    hashes_since_report: u64,
    last_rotation: Instant,
}

/// Per-unit state, owned by the unit thread
pub(crate) struct WorkerLoop {
    id: usize,
    state: UnitState,
    factory: PrimitiveFactory,
    primitive: Option<Box<dyn ComputePrimitive>>,
    range: NonceRange,
    template: Option<BlockTemplate>,
    nonce: u32,

    throttle: u8,
    stats_interval: Duration,
    rotation_interval: Duration,

    /// Cleared by STOP/DESTROY; checked between duty cycles
    running: bool,
    destroy_requested: bool,

    total_hashes: u64,
    solutions_found: u64,
    cache_reinit_count: u64,
    /// Digests that did not parse; reported in STATS
    malformed_digests: u64,
    phase_time: PhaseTime,

    commands: Receiver<UnitCommand>,
    events: UnboundedSender<UnitEvent>,
}

impl WorkerLoop {
    pub(crate) fn new(
        id: usize,
        factory: PrimitiveFactory,
        commands: Receiver<UnitCommand>,
        events: UnboundedSender<UnitEvent>,
        rotation_interval: Duration,
    ) -> Self {
        WorkerLoop {
            id,
            state: UnitState::Idle,
            factory,
            primitive: None,
            range: NonceRange {
                start: 0,
                end: u32::MAX,
            },
            template: None,
            nonce: 0,
            throttle: 0,
            stats_interval: Duration::from_millis(1000),
            rotation_interval,
            running: false,
            destroy_requested: false,
            total_hashes: 0,
            solutions_found: 0,
            cache_reinit_count: 0,
            malformed_digests: 0,
            phase_time: PhaseTime::default(),
            commands,
            events,
        }
    }

    /// Serves commands until DESTROY or until the coordinator goes away
    pub(crate) fn run(mut self) {
        loop {
            if self.running {
                self.run_session();
                if self.destroy_requested {
                    self.destroy();
                    return;
                }
                continue;
            }

            match self.commands.recv() {
                Ok(command) => {
                    if let Flow::Exit = self.handle(command) {
                        return;
                    }
                }
                Err(_) => {
                    log::debug!("unit {}: coordinator gone, releasing primitive", self.id);
                    self.release_primitive();
                    return;
                }
            }
        }
    }

    /// Handles a command received outside of a session
    fn handle(&mut self, command: UnitCommand) -> Flow {
        match command {
            UnitCommand::Init {
                unit_id,
                total_units,
                mode,
            } => self.on_init(unit_id, total_units, mode),
            UnitCommand::Start {
                throttle,
                stats_interval,
            } => self.on_start(throttle, stats_interval),
            UnitCommand::UpdateConfig { throttle } => self.set_throttle(throttle),
            UnitCommand::Stop => {
                log::debug!("unit {}: STOP ignored while {}", self.id, self.state);
            }
            UnitCommand::Destroy => {
                self.destroy();
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    fn on_init(&mut self, unit_id: usize, total_units: usize, mode: ComputeMode) {
        if !matches!(self.state, UnitState::Idle | UnitState::Error) {
            log::warn!("unit {}: INIT ignored while {}", self.id, self.state);
            return;
        }

        self.id = unit_id;
        self.state = UnitState::Initializing;

        match self.initialize(total_units, mode) {
            Ok(capabilities) => {
                self.state = UnitState::Ready;
                log::debug!(
                    "unit {}: ready ({} MB, nonces {:#010x}..={:#010x})",
                    self.id,
                    capabilities.memory_mb,
                    self.range.start,
                    self.range.end
                );
                self.emit(UnitEvent::Ready {
                    unit_id: self.id,
                    capabilities,
                });
            }
            Err(err) => self.fail(err),
        }
    }

    fn initialize(
        &mut self,
        total_units: usize,
        mode: ComputeMode,
    ) -> Result<Capabilities, Failure> {
        self.release_primitive();

        let range = partition::partition(self.id, total_units)
            .map_err(|e| Failure::new(e, "nonce partitioning"))?;
        let mut primitive = (self.factory)(self.id, mode)
            .map_err(|e| Failure::new(e, format!("creating the {} primitive", mode)))?;
        let seed = generate_seed();

        let unit_id = self.id;
        let events = self.events.clone();
        let mut last_progress = 0u8;
        let mut on_progress = |pct: u8, message: &str| {
            let pct = pct.min(100);
            if pct < last_progress {
                return;
            }
            last_progress = pct;
            let _ = events.send(UnitEvent::InitProgress {
                unit_id,
                progress: pct,
                message: message.to_string(),
                memory_info: None,
            });
        };
        init_guarded(primitive.as_mut(), &seed, &mut on_progress)
            .map_err(|e| Failure::new(e, format!("{} primitive init", mode)))?;

        let info = primitive.memory_info();
        self.emit(UnitEvent::InitProgress {
            unit_id,
            progress: 100,
            message: "initialized".into(),
            memory_info: Some(info.clone()),
        });

        self.range = range;
        self.nonce = range.start;
        self.template = Some(BlockTemplate::fresh(template::unix_now()));
        self.primitive = Some(primitive);
        self.solutions_found = 0;
        self.cache_reinit_count = 0;
        self.malformed_digests = 0;

        Ok(Capabilities {
            mode,
            memory_mb: info.total_mb,
            backend: info.backend,
        })
    }

    fn on_start(&mut self, throttle: u8, stats_interval: u64) {
        if !matches!(self.state, UnitState::Ready | UnitState::Stopped) {
            log::debug!("unit {}: START ignored while {}", self.id, self.state);
            return;
        }

        self.set_throttle(throttle);
        self.stats_interval = Duration::from_millis(stats_interval.max(1));
        self.total_hashes = 0;
        self.phase_time = PhaseTime::default();
        self.running = true;
        self.state = UnitState::Running;
        log::debug!("unit {}: running at throttle {}%", self.id, self.throttle);
    }

    /// Takes effect at the next duty cycle
    fn set_throttle(&mut self, throttle: u8) {
        self.throttle = throttle.min(MAX_THROTTLE);
    }

    fn run_session(&mut self) {
        let started = Instant::now();
        let mut session = Session {
            last_report: started,
            hashes_since_report: 0,
            last_rotation: started,
        };
        let mut duty = DutyCycle::from_throttle(self.throttle);

        while self.running {
            duty = DutyCycle::from_throttle(self.throttle);

            if let Err(err) = self.work_phase(duty.work(), &mut session) {
                self.fail(err);
                return;
            }

            if session.last_report.elapsed() >= self.stats_interval {
                self.report_stats(&mut session, duty);
            }

            if session.last_rotation.elapsed() >= self.rotation_interval {
                if let Err(err) = self.rotate_cache() {
                    self.fail(err);
                    return;
                }
                session.last_rotation = Instant::now();
            }

            self.idle_phase(duty.sleep());
        }

        // Flush so the coordinator's totals match the freeze point
        self.report_stats(&mut session, duty);
        self.state = UnitState::Stopped;
        log::debug!(
            "unit {}: stopped after {} hashes ({:.1}% measured duty)",
            self.id,
            self.total_hashes,
            self.phase_time.duty_percent()
        );
        self.emit(UnitEvent::Stopped {
            unit_id: self.id,
            total_hashes: self.total_hashes,
        });
    }

    /// Hashes until `work` has elapsed; always completes at least one digest
    fn work_phase(&mut self, work: Duration, session: &mut Session) -> Result<(), Failure> {
        let started = Instant::now();
        loop {
            self.hash_next()?;
            session.hashes_since_report += 1;
            let spent = started.elapsed();
            if spent >= work {
                self.phase_time.work += spent;
                return Ok(());
            }
        }
    }

    fn hash_next(&mut self) -> Result<(), Failure> {
        let (Some(primitive), Some(template)) = (self.primitive.as_mut(), self.template.as_mut())
        else {
            return Err(Failure::new(
                MinerError::ComputeError("unit is running without a primitive".into()),
                "hash loop",
            ));
        };

        template.set_nonce(self.nonce);
        let header = template.serialize();
        let digest = primitive.compute_digest(&header).map_err(|e| {
            Failure::new(
                e,
                format!(
                    "compute_digest at nonce {:#010x} after {} hashes",
                    self.nonce, self.total_hashes
                ),
            )
        })?;
        self.total_hashes += 1;

        match algorithm::parse_digest(&digest) {
            Ok(value) if algorithm::meets_target(&value, &DIFFICULTY_TARGET) => {
                self.solutions_found += 1;
                log::debug!(
                    "unit {}: solution at nonce {:#010x}: {}",
                    self.id,
                    self.nonce,
                    digest
                );
            }
            Ok(_) => {}
            Err(err) => {
                self.malformed_digests += 1;
                if self.malformed_digests == 1 || self.malformed_digests % 10_000 == 0 {
                    log::warn!(
                        "unit {}: {} ({} malformed so far)",
                        self.id,
                        err,
                        self.malformed_digests
                    );
                }
            }
        }

        self.nonce = self.range.next(self.nonce);
        Ok(())
    }

    /// Sleeps for the rest of the cycle while serving commands
    fn idle_phase(&mut self, sleep: Duration) {
        let started = Instant::now();
        let deadline = started + sleep;
        while self.running {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.commands.recv_timeout(remaining) {
                Ok(command) => self.handle_while_running(command),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    self.running = false;
                    self.destroy_requested = true;
                }
            }
        }
        self.phase_time.sleep += started.elapsed();
    }

    fn handle_while_running(&mut self, command: UnitCommand) {
        match command {
            UnitCommand::Stop => self.running = false,
            UnitCommand::Destroy => {
                self.running = false;
                self.destroy_requested = true;
            }
            UnitCommand::UpdateConfig { throttle } => self.set_throttle(throttle),
            other => log::debug!("unit {}: {:?} ignored while running", self.id, other),
        }
    }

    fn report_stats(&mut self, session: &mut Session, duty: DutyCycle) {
        let elapsed = session.last_report.elapsed();
        let secs = elapsed.as_secs_f64();
        let delta = session.hashes_since_report;
        let hashrate = if secs > 0.0 { delta as f64 / secs } else { 0.0 };
        let memory_usage_mb = self
            .primitive
            .as_ref()
            .map(|p| p.memory_info().total_mb)
            .unwrap_or(0);

        self.emit(UnitEvent::Stats(UnitStats {
            unit_id: self.id,
            hashes_delta: delta,
            elapsed_ms: elapsed.as_millis() as u64,
            total_hashes: self.total_hashes,
            hashrate,
            duty_cycle: duty.percent(),
            memory_usage_mb,
            solutions_found: self.solutions_found,
            cache_reinit_count: self.cache_reinit_count,
            malformed_digests: self.malformed_digests,
        }));

        session.last_report = Instant::now();
        session.hashes_since_report = 0;
    }

    /// Re-seeds the primitive; counters and nonce position are kept
    fn rotate_cache(&mut self) -> Result<(), Failure> {
        let seed = generate_seed();
        let origin = format!("seed rotation #{}", self.cache_reinit_count + 1);
        let Some(primitive) = self.primitive.as_mut() else {
            return Err(Failure::new(
                MinerError::ComputeError("no primitive to re-seed".into()),
                origin,
            ));
        };
        init_guarded(primitive.as_mut(), &seed, &mut |_, _| {})
            .map_err(|e| Failure::new(e, origin))?;

        self.cache_reinit_count += 1;
        if let Some(template) = self.template.as_mut() {
            // Strictly increasing, even for two rotations within one second
            let next = template::unix_now().max(template.timestamp().saturating_add(1));
            template.update_timestamp(next);
        }

        log::info!(
            "unit {}: seed rotated (#{})",
            self.id,
            self.cache_reinit_count
        );
        Ok(())
    }

    fn fail(&mut self, failure: Failure) {
        self.running = false;
        self.state = UnitState::Error;
        log::error!("unit {}: {} ({})", self.id, failure.error, failure.origin);

        self.emit(UnitEvent::Error {
            unit_id: self.id,
            error: failure.error.to_string(),
            details: Some(failure.details()),
        });
    }

    fn destroy(&mut self) {
        self.release_primitive();
        self.template = None;
        self.state = UnitState::Destroyed;
        log::debug!("unit {}: destroyed", self.id);
        self.emit(UnitEvent::Destroyed { unit_id: self.id });
    }

    fn release_primitive(&mut self) {
        if let Some(mut primitive) = self.primitive.take() {
            primitive.release();
        }
    }

    fn emit(&self, event: UnitEvent) {
        // The coordinator may already be gone during shutdown
        let _ = self.events.send(event);
    }
}

/// 32 random bytes from the OS, hex encoded
fn generate_seed() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    template::bytes_to_hex(&bytes)
}

/// Runs `init`, turning a panic inside the backend into `InitError`
fn init_guarded(
    primitive: &mut dyn ComputePrimitive,
    seed: &str,
    on_progress: &mut dyn FnMut(u8, &str),
) -> Result<(), MinerError> {
    panic::catch_unwind(AssertUnwindSafe(|| primitive.init(seed, on_progress)))
        .unwrap_or_else(|payload| Err(MinerError::InitError(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".into()
    }
}
