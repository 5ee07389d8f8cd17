//! `FleetConfig`: operational cadence and storage locations. Quota
//! thresholds are never configurable here — they are `const` in
//! `fleet_core::quota` and must not be re-derived elsewhere.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub db_path: PathBuf,
    pub poll_interval_secs: u64,
    pub quota_monitor_interval_secs: u64,
    pub idle_watch_interval_secs: u64,
    pub idle_timeout_secs: u64,
    pub socket_path: PathBuf,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/var/lib/gpu-fleet/fleet.db"),
            poll_interval_secs: 60,
            quota_monitor_interval_secs: 60,
            idle_watch_interval_secs: 300,
            idle_timeout_secs: 600,
            socket_path: PathBuf::from("/tmp/gpu-fleet/fleetd.sock"),
        }
    }
}

impl FleetConfig {
    /// Load an optional TOML file, falling back to defaults for any field
    /// it omits. A missing `path` is not an error — every field just takes
    /// its default.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_path_yields_defaults() {
        let config = FleetConfig::load(None).unwrap();
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.idle_timeout_secs, 600);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, "idle_timeout_secs = 120\n").unwrap();

        let config = FleetConfig::load(Some(&path)).unwrap();
        assert_eq!(config.idle_timeout_secs, 120);
        assert_eq!(config.poll_interval_secs, 60);
    }
}
