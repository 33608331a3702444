// src/miner/algorithm/cryptonight.rs
//! CryptoNight compute primitive
//!
//! Provides the CryptoNight variants as a seeded primitive:
//! - CryptoNight V7 (variant 1)
//! - CryptoNight R (variant 4)
//!
//! CryptoNight has no key, so the unit seed is prepended to every hashed
//! header instead. Rotating the seed therefore changes every digest the
//! same way re-keying RandomX does.

use crate::miner::algorithm::{ComputePrimitive, MemoryInfo};
use crate::miner::template::hex_to_bytes;
use crate::types::ComputeMode;
use crate::utils::error::MinerError;
use cryptonight::cryptonight;

/// Scratchpad size of every CryptoNight variant
const SCRATCHPAD_MB: u64 = 2;

/// CryptoNight primitive owned by a single unit
pub struct CryptoNightAlgo {
    /// Algorithm variant identifier
    ///
    /// Supported values:
    /// - `1` for CryptoNight V7
    /// - `4` for CryptoNight R
    variant: i32,

    /// Seed bytes prepended to each input; `None` until `init`
    salt: Option<[u8; 32]>,

    /// Set by `release`
    released: bool,
}

impl CryptoNightAlgo {
    /// Creates an uninitialized CryptoNight primitive for `variant`
    ///
    /// Any variant other than `4` is treated as V7.
    pub fn new(variant: i32) -> Self {
        Self {
            variant,
            salt: None,
            released: false,
        }
    }

    fn mode(&self) -> ComputeMode {
        match self.variant {
            4 => ComputeMode::CryptoNightR,
            _ => ComputeMode::CryptoNightV7,
        }
    }
}

impl ComputePrimitive for CryptoNightAlgo {
    fn init(
        &mut self,
        seed: &str,
        on_progress: &mut dyn FnMut(u8, &str),
    ) -> Result<(), MinerError> {
        if self.released {
            return Err(MinerError::ResourceReleased);
        }
        on_progress(0, "deriving CryptoNight salt");
        self.salt = Some(hex_to_bytes(seed));
        on_progress(100, "CryptoNight ready");
        Ok(())
    }

    /// Hashes `salt ‖ input` with the configured variant
    fn compute_digest(&mut self, input: &[u8]) -> Result<String, MinerError> {
        if self.released {
            return Err(MinerError::ResourceReleased);
        }
        let salt = self
            .salt
            .ok_or_else(|| MinerError::ComputeError("CryptoNight used before init".into()))?;

        let mut data = Vec::with_capacity(salt.len() + input.len());
        data.extend_from_slice(&salt);
        data.extend_from_slice(input);

        let hash = cryptonight(&data, data.len(), self.variant);
        Ok(hex::encode(hash))
    }

    fn memory_info(&self) -> MemoryInfo {
        MemoryInfo {
            total_mb: SCRATCHPAD_MB,
            mode: self.mode(),
            backend: "cryptonight".into(),
        }
    }

    fn release(&mut self) {
        self.salt = None;
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::parse_digest;

    #[test]
    fn digest_is_64_hex_chars_and_deterministic() {
        let mut cn = CryptoNightAlgo::new(1);
        cn.init(&"11".repeat(32), &mut |_, _| {}).unwrap();

        let a = cn.compute_digest(&[7u8; 76]).unwrap();
        let b = cn.compute_digest(&[7u8; 76]).unwrap();
        assert_eq!(a, b);
        assert!(parse_digest(&a).is_ok());
    }

    #[test]
    fn seed_changes_digest() {
        let mut cn = CryptoNightAlgo::new(4);
        cn.init(&"11".repeat(32), &mut |_, _| {}).unwrap();
        let first = cn.compute_digest(&[0u8; 76]).unwrap();

        cn.init(&"22".repeat(32), &mut |_, _| {}).unwrap();
        let second = cn.compute_digest(&[0u8; 76]).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn progress_reaches_one_hundred() {
        let mut cn = CryptoNightAlgo::new(1);
        let mut seen = Vec::new();
        cn.init("ab", &mut |pct, _| seen.push(pct)).unwrap();
        assert_eq!(seen, vec![0, 100]);
    }

    #[test]
    fn operations_after_release_fail() {
        let mut cn = CryptoNightAlgo::new(1);
        cn.init(&"33".repeat(32), &mut |_, _| {}).unwrap();
        cn.release();

        assert!(matches!(
            cn.compute_digest(&[0u8; 76]),
            Err(MinerError::ResourceReleased)
        ));
        assert!(matches!(
            cn.init(&"33".repeat(32), &mut |_, _| {}),
            Err(MinerError::ResourceReleased)
        ));
    }

    #[test]
    fn variant_selects_mode() {
        assert_eq!(
            CryptoNightAlgo::new(1).memory_info().mode,
            ComputeMode::CryptoNightV7
        );
        assert_eq!(
            CryptoNightAlgo::new(4).memory_info().mode,
            ComputeMode::CryptoNightR
        );
    }
}
