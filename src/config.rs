//! Runtime configuration for the SprintPulse engine
//!
//! Layered loading: built-in defaults, overridden by an optional TOML file,
//! overridden by `SPRINTPULSE_*` environment variables (e.g.
//! `SPRINTPULSE_BASELINE__WINDOW_DAYS=60`).

use crate::error::Result;
use crate::predict::RiskModel;
use serde::{Deserialize, Serialize};

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Pinned scoring formula; must name a registered [`RiskModel`]
    pub model_version: String,

    pub baseline: BaselineConfig,
}

/// Rolling-baseline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Trailing window over historical signal values, in days
    pub window_days: i64,

    /// Minimum historical points before z-scores are trusted
    pub min_samples: usize,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            database_path: "sprintpulse.db".to_string(),
            model_version: RiskModel::LogisticV1.version().to_string(),
            baseline: BaselineConfig::default(),
        }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            min_samples: 3,
        }
    }
}

impl PulseConfig {
    /// Load configuration, layering an optional file under environment
    /// overrides
    pub fn load(file: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SPRINTPULSE").separator("__"),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PulseConfig::default();
        assert_eq!(config.model_version, "logistic-v1");
        assert_eq!(config.baseline.window_days, 90);
        assert_eq!(config.baseline.min_samples, 3);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = PulseConfig::load(None).unwrap();
        assert_eq!(config, PulseConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "database_path = \"/tmp/test.db\"\n\n[baseline]\nwindow_days = 60"
        )
        .unwrap();

        let config = PulseConfig::load(path.to_str()).unwrap();
        assert_eq!(config.database_path, "/tmp/test.db");
        assert_eq!(config.baseline.window_days, 60);
        // Untouched keys keep their defaults
        assert_eq!(config.baseline.min_samples, 3);
        assert_eq!(config.model_version, "logistic-v1");
    }
}
