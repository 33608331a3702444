// src/miner/algorithm/randomx.rs
//! RandomX compute primitive
//!
//! Wraps the RandomX context (cache, plus dataset in fast mode) and a VM
//! bound to it. This module handles:
//! - Context construction from a unit seed
//! - Re-keying on seed rotation
//! - Hashing serialized block headers

use crate::miner::algorithm::{ComputePrimitive, MemoryInfo};
use crate::miner::template::hex_to_bytes;
use crate::types::ComputeMode;
use crate::utils::error::MinerError;
use rust_randomx::{Context, Hasher};
use std::sync::Arc;

/// Cache size in light mode
const LIGHT_MEMORY_MB: u64 = 256;

/// Cache plus dataset size in fast mode
const FAST_MEMORY_MB: u64 = 2080;

/// RandomX primitive owned by a single unit
///
/// Each unit builds its own context from its own seed; contexts are never
/// shared, which keeps the per-unit memory private at the cost of
/// `units × footprint` total memory.
pub struct RandomX {
    /// Fast mode builds the full dataset
    fast: bool,

    /// VM bound to the current context; `None` until `init`
    hasher: Option<Hasher>,

    /// Set by `release`; every later call fails
    released: bool,
}

impl RandomX {
    /// Creates an uninitialized RandomX primitive
    ///
    /// # Arguments
    /// * `fast` - Enables fast mode (~2080 MB instead of ~256 MB)
    ///
    /// # Performance Notes
    /// Nothing is allocated here; the expensive context build happens in
    /// [`ComputePrimitive::init`].
    pub fn new(fast: bool) -> Self {
        Self {
            fast,
            hasher: None,
            released: false,
        }
    }

    fn mode(&self) -> ComputeMode {
        if self.fast {
            ComputeMode::RandomXFast
        } else {
            ComputeMode::RandomXLight
        }
    }
}

impl ComputePrimitive for RandomX {
    /// Builds a context keyed by the seed's 32 normalized bytes
    fn init(
        &mut self,
        seed: &str,
        on_progress: &mut dyn FnMut(u8, &str),
    ) -> Result<(), MinerError> {
        if self.released {
            return Err(MinerError::ResourceReleased);
        }

        let key = hex_to_bytes(seed);
        on_progress(
            0,
            if self.fast {
                "allocating RandomX dataset"
            } else {
                "allocating RandomX cache"
            },
        );

        // Free the old context before building its replacement
        self.hasher = None;

        let context = Arc::new(Context::new(&key, self.fast));
        on_progress(90, "creating RandomX virtual machine");

        self.hasher = Some(Hasher::new(context));
        on_progress(100, "RandomX ready");
        Ok(())
    }

    fn compute_digest(&mut self, input: &[u8]) -> Result<String, MinerError> {
        if self.released {
            return Err(MinerError::ResourceReleased);
        }
        let hasher = self
            .hasher
            .as_ref()
            .ok_or_else(|| MinerError::ComputeError("RandomX used before init".into()))?;

        let output = hasher.hash(input);
        Ok(hex::encode(output.as_ref()))
    }

    fn memory_info(&self) -> MemoryInfo {
        MemoryInfo {
            total_mb: if self.fast {
                FAST_MEMORY_MB
            } else {
                LIGHT_MEMORY_MB
            },
            mode: self.mode(),
            backend: "randomx".into(),
        }
    }

    fn release(&mut self) {
        self.hasher = None;
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = "6162636465666768696a6b6c6d6e6f707172737475767778797a414243444546";

    #[test]
    fn compute_before_init_fails() {
        let mut rx = RandomX::new(false);
        assert!(matches!(
            rx.compute_digest(b"header"),
            Err(MinerError::ComputeError(_))
        ));
    }

    #[test]
    fn released_primitive_refuses_work() {
        let mut rx = RandomX::new(false);
        rx.release();
        assert!(matches!(
            rx.init(SEED, &mut |_, _| {}),
            Err(MinerError::ResourceReleased)
        ));
        assert!(matches!(
            rx.compute_digest(b"header"),
            Err(MinerError::ResourceReleased)
        ));
    }

    #[test]
    #[ignore = "allocates a 256 MB RandomX cache"]
    fn light_mode_hashes_deterministically() {
        let mut rx = RandomX::new(false);
        let mut progress = Vec::new();
        rx.init(SEED, &mut |pct, _| progress.push(pct)).unwrap();
        assert_eq!(progress.last(), Some(&100));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));

        let a = rx.compute_digest(&[0u8; 76]).unwrap();
        let b = rx.compute_digest(&[0u8; 76]).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);

        rx.release();
        assert!(rx.compute_digest(&[0u8; 76]).is_err());
    }
}
