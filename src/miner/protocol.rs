// src/miner/protocol.rs
//! Coordinator ⇄ unit message protocol
//!
//! Units and the coordinator share no memory; everything travels as one of
//! these messages. Commands flow to a unit over its crossbeam channel, events
//! flow back over a single tokio channel drained by the coordinator. Both
//! enums serialize to the wire names used by the JSON protocol
//! (`{"type":"START","throttle":30,"statsInterval":1000}`).

use crate::miner::algorithm::MemoryInfo;
use crate::types::ComputeMode;
use serde::{Deserialize, Serialize};

/// Commands a unit accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitCommand {
    /// Set up the compute primitive, partition and block template
    #[serde(rename_all = "camelCase")]
    Init {
        /// Index of the receiving unit
        unit_id: usize,
        /// Pool size, used for partitioning
        total_units: usize,
        /// Compute primitive to build
        mode: ComputeMode,
    },

    /// Enter the hash loop
    #[serde(rename_all = "camelCase")]
    Start {
        /// Throttle percentage (0..=90)
        throttle: u8,
        /// Milliseconds between STATS events
        stats_interval: u64,
    },

    /// Leave the hash loop at the next iteration boundary
    Stop,

    /// Change the throttle of subsequent duty cycles
    #[serde(rename_all = "camelCase")]
    UpdateConfig {
        /// New throttle percentage
        throttle: u8,
    },

    /// Stop if needed, release the primitive and exit
    Destroy,
}

/// What a unit announces once it is ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Mode the primitive was built for
    pub mode: ComputeMode,
    /// Memory reserved by the primitive
    #[serde(rename = "memoryMB")]
    pub memory_mb: u64,
    /// Backend identifier
    pub backend: String,
}

/// Periodic throughput report of a running unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitStats {
    /// Reporting unit
    pub unit_id: usize,
    /// Hashes since the previous report
    pub hashes_delta: u64,
    /// Milliseconds since the previous report
    pub elapsed_ms: u64,
    /// Hashes in the current session
    pub total_hashes: u64,
    /// `hashes_delta` per second
    pub hashrate: f64,
    /// Duty cycle of the current throttle, in percent
    pub duty_cycle: f64,
    /// Memory reserved by the primitive
    #[serde(rename = "memoryUsageMB")]
    pub memory_usage_mb: u64,
    /// Digests below the difficulty target so far
    pub solutions_found: u64,
    /// Seed rotations so far
    pub cache_reinit_count: u64,
    /// Digests that did not parse as hex since INIT
    #[serde(default)]
    pub malformed_digests: u64,
}

/// Events a unit emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitEvent {
    /// Initialization progress, monotonically increasing 0..=100
    #[serde(rename_all = "camelCase")]
    InitProgress {
        /// Reporting unit
        unit_id: usize,
        /// Percent complete
        progress: u8,
        /// Human-readable step
        message: String,
        /// Attached once the primitive knows its footprint
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memory_info: Option<MemoryInfo>,
    },

    /// Initialization succeeded
    #[serde(rename_all = "camelCase")]
    Ready {
        /// Reporting unit
        unit_id: usize,
        /// Primitive description
        capabilities: Capabilities,
    },

    /// Throughput report
    Stats(UnitStats),

    /// Initialization or hashing failed; the unit is now in `Error`
    #[serde(rename_all = "camelCase")]
    Error {
        /// Reporting unit
        unit_id: usize,
        /// Failure message
        error: String,
        /// Where the failure surfaced, followed by the stack when captured
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },

    /// The session ended after STOP
    #[serde(rename_all = "camelCase")]
    Stopped {
        /// Reporting unit
        unit_id: usize,
        /// Hashes computed in the finished session
        total_hashes: u64,
    },

    /// Resources released; the unit thread is exiting
    #[serde(rename_all = "camelCase")]
    Destroyed {
        /// Reporting unit
        unit_id: usize,
    },
}

impl UnitEvent {
    /// Unit the event originates from
    pub fn unit_id(&self) -> usize {
        match self {
            UnitEvent::InitProgress { unit_id, .. }
            | UnitEvent::Ready { unit_id, .. }
            | UnitEvent::Error { unit_id, .. }
            | UnitEvent::Stopped { unit_id, .. }
            | UnitEvent::Destroyed { unit_id } => *unit_id,
            UnitEvent::Stats(stats) => stats.unit_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn commands_use_wire_names() {
        let init = UnitCommand::Init {
            unit_id: 2,
            total_units: 4,
            mode: ComputeMode::CryptoNightR,
        };
        assert_eq!(
            serde_json::to_value(&init).unwrap(),
            json!({"type": "INIT", "unitId": 2, "totalUnits": 4, "mode": "cryptonight-r"})
        );

        let start = UnitCommand::Start {
            throttle: 30,
            stats_interval: 1000,
        };
        assert_eq!(
            serde_json::to_value(&start).unwrap(),
            json!({"type": "START", "throttle": 30, "statsInterval": 1000})
        );

        assert_eq!(
            serde_json::to_value(UnitCommand::UpdateConfig { throttle: 5 }).unwrap(),
            json!({"type": "UPDATE_CONFIG", "throttle": 5})
        );
        assert_eq!(
            serde_json::to_value(UnitCommand::Stop).unwrap(),
            json!({"type": "STOP"})
        );
    }

    #[test]
    fn commands_parse_from_wire() {
        let cmd: UnitCommand = serde_json::from_str(r#"{"type":"DESTROY"}"#).unwrap();
        assert_eq!(cmd, UnitCommand::Destroy);
    }

    #[test]
    fn stats_event_uses_wire_names() {
        let event = UnitEvent::Stats(UnitStats {
            unit_id: 1,
            hashes_delta: 500,
            elapsed_ms: 1000,
            total_hashes: 1500,
            hashrate: 500.0,
            duty_cycle: 70.0,
            memory_usage_mb: 256,
            solutions_found: 2,
            cache_reinit_count: 1,
            malformed_digests: 3,
        });
        let value = serde_json::to_value(&event).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "type",
            "unitId",
            "hashesDelta",
            "elapsedMs",
            "totalHashes",
            "hashrate",
            "dutyCycle",
            "memoryUsageMB",
            "solutionsFound",
            "cacheReinitCount",
            "malformedDigests",
        ] {
            assert!(obj.contains_key(key), "missing {}", key);
        }
        assert_eq!(obj["type"], Value::from("STATS"));
    }

    #[test]
    fn ready_event_nests_capabilities() {
        let event = UnitEvent::Ready {
            unit_id: 0,
            capabilities: Capabilities {
                mode: ComputeMode::RandomXLight,
                memory_mb: 256,
                backend: "randomx".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "READY",
                "unitId": 0,
                "capabilities": {"mode": "randomx-light", "memoryMB": 256, "backend": "randomx"}
            })
        );
    }

    #[test]
    fn optional_fields_are_omitted() {
        let event = UnitEvent::Error {
            unit_id: 3,
            error: "boom".into(),
            details: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "ERROR", "unitId": 3, "error": "boom"})
        );
        assert_eq!(event.unit_id(), 3);
    }
}
