// src/miner/template.rs
//! Block header template and its binary encoding
//!
//! Each unit hashes its own copy of a [`BlockTemplate`]. The encoded header
//! is always 76 bytes, multi-byte integers little-endian:
//!
//! | bytes   | field       |
//! |---------|-------------|
//! | 0..4    | version     |
//! | 4..8    | timestamp   |
//! | 8..40   | prev_hash   |
//! | 40..44  | nonce       |
//! | 44..76  | merkle_root |

use rand::RngCore;
use rand::rngs::OsRng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Size of a serialized header
pub const HEADER_SIZE: usize = 76;

/// Byte offset of the nonce inside a serialized header
pub const NONCE_OFFSET: usize = 40;

/// Mutable block header owned by a single unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    version: u32,
    prev_hash: [u8; 32],
    merkle_root: [u8; 32],
    timestamp: u32,
    nonce: u32,
}

impl BlockTemplate {
    /// Creates a template from explicit field values with nonce 0
    pub fn new(version: u32, prev_hash: [u8; 32], merkle_root: [u8; 32], timestamp: u32) -> Self {
        BlockTemplate {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            nonce: 0,
        }
    }

    /// Version 1 template on a zero parent with a random merkle root
    pub fn fresh(timestamp: u32) -> Self {
        let mut merkle_root = [0u8; 32];
        OsRng.fill_bytes(&mut merkle_root);
        Self::new(1, [0u8; 32], merkle_root, timestamp)
    }

    /// Sets the nonce to hash next
    pub fn set_nonce(&mut self, nonce: u32) {
        self.nonce = nonce;
    }

    /// Replaces the header timestamp
    pub fn update_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    /// Current nonce
    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    /// Current timestamp (seconds since the epoch)
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Merkle root of the template
    pub fn merkle_root(&self) -> &[u8; 32] {
        &self.merkle_root
    }

    /// Encodes the current fields into a new 76-byte buffer
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..8].copy_from_slice(&self.timestamp.to_le_bytes());
        out[8..40].copy_from_slice(&self.prev_hash);
        out[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&self.nonce.to_le_bytes());
        out[44..76].copy_from_slice(&self.merkle_root);
        out
    }
}

/// Seconds since the Unix epoch, saturated to `u32`
pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u64::from(u32::MAX)) as u32)
        .unwrap_or(0)
}

/// Lowercase hex encoding
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decodes hex into exactly 32 bytes
///
/// Never fails: input beyond 64 characters is ignored, missing bytes are
/// zero, and a character that is not a hex digit counts as `0`.
pub fn hex_to_bytes(input: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut nibbles = input.chars().take(64).map(|c| c.to_digit(16).unwrap_or(0) as u8);

    for byte in out.iter_mut() {
        let Some(high) = nibbles.next() else { break };
        let low = nibbles.next().unwrap_or(0);
        *byte = (high << 4) | low;
    }

    out
}
