//! Configuration file loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use tether_types::EngineConfig;

/// Read an [`EngineConfig`] from a JSON file.
pub fn read_config(path: &Path) -> Result<EngineConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Load the configuration, falling back to defaults when absent or invalid.
pub fn load_config(path: Option<&Path>) -> EngineConfig {
    let Some(path) = path else {
        info!("No config file given, using defaults");
        return EngineConfig::default();
    };

    match read_config(path) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded config");
            config
        }
        Err(e) => {
            warn!("{:#}, using defaults", e);
            EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.json")));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_invalid_json_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        assert!(read_config(file.path()).is_err());
        assert_eq!(load_config(Some(file.path())), EngineConfig::default());
    }

    #[test]
    fn test_partial_file_overrides_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ "pump_interval_ms": 20, "download_dir": "shots" }"#)
            .unwrap();

        let config = load_config(Some(file.path()));
        assert_eq!(config.pump_interval_ms, 20);
        assert_eq!(config.download_dir, Path::new("shots"));
        assert_eq!(config.storage_capacity, EngineConfig::default().storage_capacity);
    }
}
