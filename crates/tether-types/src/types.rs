//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default interval between native event pump ticks.
pub const DEFAULT_PUMP_INTERVAL_MS: u64 = 50;

/// Host storage capacity announced to a camera saving images to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCapacity {
    /// Number of free clusters on the host.
    pub free_clusters: u32,

    /// Bytes per sector.
    pub bytes_per_sector: u32,

    /// Whether the camera should reset its remaining-shots counter.
    pub reset: bool,
}

impl Default for StorageCapacity {
    fn default() -> Self {
        Self {
            free_clusters: 10_000_000,
            bytes_per_sector: 512,
            reset: true,
        }
    }
}

/// Configuration for the tethering engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sleep between device-thread iterations, in milliseconds (default: 50).
    pub pump_interval_ms: u64,

    /// Directory that transferred images are written to (default: cwd).
    pub download_dir: PathBuf,

    /// Capacity announced to cameras during connect.
    pub storage_capacity: StorageCapacity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pump_interval_ms: DEFAULT_PUMP_INTERVAL_MS,
            download_dir: PathBuf::from("."),
            storage_capacity: StorageCapacity::default(),
        }
    }
}

impl EngineConfig {
    /// Sleep between device-thread iterations.
    pub fn pump_interval(&self) -> Duration {
        Duration::from_millis(self.pump_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "download_dir": "/tmp/shots" }"#).unwrap();
        assert_eq!(config.download_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(config.pump_interval_ms, DEFAULT_PUMP_INTERVAL_MS);
        assert_eq!(config.storage_capacity, StorageCapacity::default());
    }
}
