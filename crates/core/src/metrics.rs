//! Runtime metrics — a closed, typed set of known fields.
//!
//! Deliberately not an open-ended key/value map: every metric the system
//! reports is a named field here, so type safety holds across the boundary
//! to UI layers.

use crate::engine::EngineMemoryStats;
use crate::network::NetworkQuality;
use serde::{Deserialize, Serialize};

/// A snapshot of process-level resource indicators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeMetrics {
    /// Bytes attributed to the inference engine
    pub memory_bytes: u64,

    /// CPU utilization in percent, when the host reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,

    /// Estimated usable network bandwidth in kbit/s
    pub network_kbps: u32,

    /// Battery charge in percent, when the host reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<f32>,
}

impl RuntimeMetrics {
    /// Build a snapshot from engine memory stats and network quality.
    ///
    /// The bandwidth figure is a coarse bucket per quality level; hosts with
    /// a real measurement can overwrite it.
    pub fn from_engine(stats: &EngineMemoryStats, quality: NetworkQuality) -> Self {
        let network_kbps = match quality {
            NetworkQuality::Offline => 0,
            NetworkQuality::Constrained => 500,
            NetworkQuality::Good => 10_000,
        };
        Self {
            memory_bytes: stats.total_bytes,
            cpu_percent: None,
            network_kbps,
            battery_percent: None,
        }
    }
}
