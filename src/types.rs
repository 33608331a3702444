// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compute modes a unit can be initialized with
///
/// The mode selects which compute primitive backs a unit and how much
/// memory it reserves. Two backends exist (`randomx` and `cryptonight`);
/// each exposes more than one mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum ComputeMode {
    /// RandomX in light mode (256 MB cache per unit)
    #[clap(name = "randomx-light")]
    #[serde(rename = "randomx-light")]
    RandomXLight,

    /// RandomX in fast mode (full 2080 MB dataset per unit)
    ///
    /// Considerably faster per hash, but dataset generation takes
    /// several seconds and multiplies memory use by the unit count.
    #[clap(name = "randomx-fast")]
    #[serde(rename = "randomx-fast")]
    RandomXFast,

    /// CryptoNight variant 7 (2 MB scratchpad)
    #[clap(name = "cryptonight-v7")]
    #[serde(rename = "cryptonight-v7")]
    CryptoNightV7,

    /// CryptoNight-R (2 MB scratchpad)
    #[clap(name = "cryptonight-r")]
    #[serde(rename = "cryptonight-r")]
    CryptoNightR,
}

impl ComputeMode {
    /// Identifier of the primitive implementation behind this mode
    pub fn backend(&self) -> &'static str {
        match self {
            ComputeMode::RandomXLight | ComputeMode::RandomXFast => "randomx",
            ComputeMode::CryptoNightV7 | ComputeMode::CryptoNightR => "cryptonight",
        }
    }
}

impl fmt::Display for ComputeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeMode::RandomXLight => write!(f, "randomx-light"),
            ComputeMode::RandomXFast => write!(f, "randomx-fast"),
            ComputeMode::CryptoNightV7 => write!(f, "cryptonight-v7"),
            ComputeMode::CryptoNightR => write!(f, "cryptonight-r"),
        }
    }
}

impl FromStr for ComputeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "randomx" | "randomx-light" | "light" => Ok(ComputeMode::RandomXLight),
            "randomx-fast" | "fast" => Ok(ComputeMode::RandomXFast),
            "cnv7" | "cryptonight-v7" => Ok(ComputeMode::CryptoNightV7),
            "cnr" | "cryptonight-r" => Ok(ComputeMode::CryptoNightR),
            _ => Err(format!("Unknown compute mode: {}", s)),
        }
    }
}

/// Lifecycle state of a single compute unit
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    /// Spawned, not yet initialized
    #[default]
    Idle,
    /// Compute primitive is being set up
    Initializing,
    /// Initialized and waiting for START
    Ready,
    /// Inside the duty-cycled hash loop
    Running,
    /// Session finished cooperatively; can be restarted
    Stopped,
    /// Initialization or the hash loop failed
    Error,
    /// Resources released; terminal
    Destroyed,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitState::Idle => "idle",
            UnitState::Initializing => "initializing",
            UnitState::Ready => "ready",
            UnitState::Running => "running",
            UnitState::Stopped => "stopped",
            UnitState::Error => "error",
            UnitState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Coordinator-side view of one compute unit
///
/// Only the coordinator's event handlers write to this record; values are
/// the last ones a unit reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRuntimeState {
    /// Unit index, also its partition index
    pub id: usize,
    /// Last known lifecycle state
    pub state: UnitState,
    /// Hashes computed in the current session
    pub total_hashes: u64,
    /// Hashrate from the most recent STATS event (H/s)
    pub last_hashrate: f64,
    /// Duty cycle from the most recent STATS event, in percent
    pub duty_cycle: f64,
    /// Digests found below the difficulty target
    pub solutions_found: u64,
    /// Number of seed rotations performed
    pub cache_reinit_count: u64,
    /// Digests the primitive returned that did not parse
    pub malformed_digests: u64,
    /// Memory reserved by the unit's primitive (MB)
    pub memory_mb: u64,
    /// Backend identifier reported at READY
    pub backend: Option<String>,
    /// Failure message, if the unit entered `Error`
    pub error: Option<String>,
}

impl WorkerRuntimeState {
    /// Creates an idle record for unit `id`
    pub fn new(id: usize) -> Self {
        WorkerRuntimeState {
            id,
            ..Default::default()
        }
    }
}
