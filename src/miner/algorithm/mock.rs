// src/miner/algorithm/mock.rs
//! Scripted primitive for worker and coordinator tests

use crate::miner::algorithm::{ComputePrimitive, MemoryInfo, PrimitiveFactory};
use crate::types::ComputeMode;
use crate::utils::error::MinerError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a scripted primitive behaves
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Script {
    /// Every digest is above the target
    Miss,
    /// Every digest is zero, i.e. a solution
    Hit,
    /// Digests are not hex at all
    Malformed,
    /// `init` returns an error
    FailInit,
    /// `init` panics
    PanicInit,
    /// The n+1-th digest fails
    FailAfter(u64),
    /// `init` blocks for the given milliseconds, then succeeds
    SlowInit(u64),
}

/// Shared counters the tests inspect
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub inits: AtomicU64,
    pub releases: AtomicU64,
    pub digests: AtomicU64,
    /// Distinct header timestamps in the order they were hashed
    pub timestamps: Mutex<Vec<u32>>,
}

impl Tally {
    pub fn inits(&self) -> u64 {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn digests(&self) -> u64 {
        self.digests.load(Ordering::SeqCst)
    }

    pub fn timestamps(&self) -> Vec<u32> {
        self.timestamps.lock().unwrap().clone()
    }
}

pub(crate) struct MockPrimitive {
    script: Script,
    mode: ComputeMode,
    tally: Arc<Tally>,
    initialized: bool,
    released: bool,
    computed: u64,
}

impl ComputePrimitive for MockPrimitive {
    fn init(
        &mut self,
        _seed: &str,
        on_progress: &mut dyn FnMut(u8, &str),
    ) -> Result<(), MinerError> {
        if self.released {
            return Err(MinerError::ResourceReleased);
        }
        match self.script {
            Script::FailInit => return Err(MinerError::InitError("scripted failure".into())),
            Script::PanicInit => panic!("scripted panic"),
            Script::SlowInit(ms) => std::thread::sleep(Duration::from_millis(ms)),
            _ => {}
        }
        // Deliberately out of order; units must not forward the regression
        on_progress(10, "allocating");
        on_progress(60, "mixing");
        on_progress(40, "late report");
        on_progress(100, "done");

        self.tally.inits.fetch_add(1, Ordering::SeqCst);
        self.initialized = true;
        Ok(())
    }

    fn compute_digest(&mut self, input: &[u8]) -> Result<String, MinerError> {
        if self.released {
            return Err(MinerError::ResourceReleased);
        }
        if !self.initialized {
            return Err(MinerError::ComputeError("mock used before init".into()));
        }
        self.computed += 1;
        self.tally.digests.fetch_add(1, Ordering::SeqCst);

        if input.len() >= 8 {
            let ts = u32::from_le_bytes([input[4], input[5], input[6], input[7]]);
            let mut seen = self.tally.timestamps.lock().unwrap();
            if seen.last() != Some(&ts) {
                seen.push(ts);
            }
        }

        match self.script {
            Script::Hit => Ok("00".repeat(32)),
            Script::Malformed => Ok("not-a-digest".into()),
            Script::FailAfter(n) if self.computed > n => {
                Err(MinerError::ComputeError("scripted hash failure".into()))
            }
            _ => Ok("ff".repeat(32)),
        }
    }

    fn memory_info(&self) -> MemoryInfo {
        MemoryInfo {
            total_mb: 1,
            mode: self.mode,
            backend: "mock".into(),
        }
    }

    fn release(&mut self) {
        self.released = true;
        self.tally.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory whose units follow `script_for(unit_id)`
pub(crate) fn factory<F>(tally: Arc<Tally>, script_for: F) -> PrimitiveFactory
where
    F: Fn(usize) -> Script + Send + Sync + 'static,
{
    Arc::new(move |unit_id, mode| {
        Ok(Box::new(MockPrimitive {
            script: script_for(unit_id),
            mode,
            tally: Arc::clone(&tally),
            initialized: false,
            released: false,
            computed: 0,
        }) as Box<dyn ComputePrimitive>)
    })
}
