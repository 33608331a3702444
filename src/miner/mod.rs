// src/miner/mod.rs
//! Core benchmark functionality
//!
//! This module contains all components related to the hashing process:
//! - Compute primitives (RandomX, CryptoNight)
//! - Nonce partitioning, block templates and duty cycles
//! - The unit protocol, unit threads and the coordinator driving them

/// Compute primitive implementations
///
/// Contains the [`ComputePrimitive`](algorithm::ComputePrimitive) contract
/// and its backends:
/// - RandomX (light and fast mode)
/// - CryptoNight variants
pub mod algorithm;

/// Benchmark coordinator
///
/// Spawns the units, tracks their state and aggregates their statistics.
pub mod coordinator;

/// Nonce space partitioning
pub mod partition;

/// Commands and events exchanged between coordinator and units
pub mod protocol;

/// Block header template and serialization
pub mod template;

/// Duty-cycle policy
pub mod throttle;

/// Unit thread implementation
///
/// Contains the per-unit state machine and its duty-cycled hash loop.
pub mod worker;

// Re-export main components for cleaner imports
pub use self::algorithm::{ComputePrimitive, MemoryInfo, PrimitiveFactory};
pub use self::coordinator::{Coordinator, InitSummary};
pub use self::partition::{NonceRange, partition};
pub use self::protocol::{UnitCommand, UnitEvent, UnitStats};
pub use self::template::BlockTemplate;
pub use self::throttle::DutyCycle;
pub use self::worker::UnitHandle;
