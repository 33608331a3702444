// src/miner/algorithm/mod.rs
//! Compute primitives
//!
//! A compute primitive is the memory-hard digest function a unit hashes
//! block headers with. Units only ever see the [`ComputePrimitive`] trait;
//! which implementation backs it is chosen by the [`ComputeMode`]:
//! - RandomX (light or fast mode)
//! - CryptoNight variants

/// RandomX-backed primitive
///
/// The seed is the RandomX key; every re-initialization rebuilds the cache
/// (and the dataset in fast mode).
pub mod randomx;

/// CryptoNight-backed primitive
///
/// The seed salts every hashed input; the 2 MB scratchpad lives inside the
/// CryptoNight implementation.
pub mod cryptonight;

#[cfg(test)]
pub(crate) mod mock;

use crate::types::ComputeMode;
use crate::utils::error::MinerError;
use hex_literal::hex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use self::cryptonight::CryptoNightAlgo;
pub use self::randomx::RandomX;

/// Digests strictly below this value count as solutions
///
/// Read as a big-endian 256-bit integer; roughly one digest in 2^20 qualifies.
pub const DIFFICULTY_TARGET: [u8; 32] =
    hex!("00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff");

/// Memory footprint of an initialized primitive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Memory reserved per instance
    #[serde(rename = "totalMB")]
    pub total_mb: u64,
    /// Mode the primitive was built for
    pub mode: ComputeMode,
    /// Backend identifier
    pub backend: String,
}

/// Common interface for all compute primitives
///
/// Each unit owns exactly one instance; nothing is shared across units, so
/// implementations only need to be `Send`. All calls block the owning unit's
/// thread until they complete.
pub trait ComputePrimitive: Send {
    /// (Re)initialize from `seed`, reporting progress from 0 to 100
    ///
    /// Calling it again replaces the previous state with one derived from
    /// the new seed.
    ///
    /// # Errors
    /// `ResourceReleased` after [`release`](Self::release), `InitError` if
    /// the backend cannot be set up.
    fn init(&mut self, seed: &str, on_progress: &mut dyn FnMut(u8, &str))
    -> Result<(), MinerError>;

    /// Hash `input` and return the digest as lowercase hex
    ///
    /// # Errors
    /// `ResourceReleased` after release, `ComputeError` before `init`.
    fn compute_digest(&mut self, input: &[u8]) -> Result<String, MinerError>;

    /// Footprint of the primitive
    fn memory_info(&self) -> MemoryInfo;

    /// Free the backend's memory; every later call fails
    fn release(&mut self);
}

/// Builds the primitive for a unit
///
/// Called on the unit's own thread so the allocation is private to it.
pub type PrimitiveFactory =
    Arc<dyn Fn(usize, ComputeMode) -> Result<Box<dyn ComputePrimitive>, MinerError> + Send + Sync>;

/// Creates the primitive backing `mode`
pub fn create(mode: ComputeMode) -> Box<dyn ComputePrimitive> {
    match mode {
        ComputeMode::RandomXLight => Box::new(RandomX::new(false)),
        ComputeMode::RandomXFast => Box::new(RandomX::new(true)),
        ComputeMode::CryptoNightV7 => Box::new(CryptoNightAlgo::new(1)),
        ComputeMode::CryptoNightR => Box::new(CryptoNightAlgo::new(4)),
    }
}

/// Factory used outside of tests: one real primitive per unit
pub fn default_factory() -> PrimitiveFactory {
    Arc::new(|_, mode| Ok(create(mode)))
}

/// Parses a hex digest as a 256-bit big-endian value
///
/// # Errors
/// `MalformedDigest` unless the input is exactly 64 hex characters
/// (an optional `0x` prefix is accepted).
pub fn parse_digest(digest: &str) -> Result<[u8; 32], MinerError> {
    let trimmed = digest.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    let mut value = [0u8; 32];
    hex::decode_to_slice(hex_part, &mut value)
        .map_err(|e| MinerError::MalformedDigest(format!("{:?}: {}", digest, e)))?;
    Ok(value)
}

/// Whether `digest < target` as unsigned big-endian integers
pub fn meets_target(digest: &[u8; 32], target: &[u8; 32]) -> bool {
    digest < target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_digest_accepts_64_hex_chars() {
        let digest = "00".repeat(31) + "2a";
        let value = parse_digest(&digest).unwrap();
        assert_eq!(value[31], 0x2a);
        assert!(parse_digest(&format!("0x{}", digest)).is_ok());
    }

    #[test]
    fn parse_digest_rejects_bad_input() {
        for bad in ["", "abc", "zz".repeat(32).as_str(), "00".repeat(33).as_str()] {
            assert!(matches!(
                parse_digest(bad),
                Err(MinerError::MalformedDigest(_))
            ));
        }
    }

    #[test]
    fn target_comparison_is_numeric() {
        let zero = [0u8; 32];
        let max = [0xFF; 32];
        assert!(meets_target(&zero, &DIFFICULTY_TARGET));
        assert!(!meets_target(&max, &DIFFICULTY_TARGET));
        assert!(!meets_target(&DIFFICULTY_TARGET, &DIFFICULTY_TARGET));

        // A high leading byte outweighs everything after it
        let mut just_above = [0u8; 32];
        just_above[2] = 0x10;
        assert!(!meets_target(&just_above, &DIFFICULTY_TARGET));
        let mut just_below = DIFFICULTY_TARGET;
        just_below[31] = 0xFE;
        assert!(meets_target(&just_below, &DIFFICULTY_TARGET));
    }

    #[test]
    fn modes_map_to_backends() {
        for mode in [
            ComputeMode::RandomXLight,
            ComputeMode::RandomXFast,
            ComputeMode::CryptoNightV7,
            ComputeMode::CryptoNightR,
        ] {
            let info = create(mode).memory_info();
            assert_eq!(info.mode, mode);
            assert_eq!(info.backend, mode.backend());
        }
    }
}
