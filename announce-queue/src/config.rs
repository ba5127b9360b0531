//! Engine configuration
//!
//! Bootstrap settings are read once at startup from a TOML file. Every field
//! has a built-in default, so an absent file yields a working engine with no
//! zones (zones can still be given on the command line).
//!
//! ```toml
//! gap_secs = 3
//! memory = 5
//! default_duration_secs = 90
//! bus_capacity = 1000
//! default_volume = 1.0
//!
//! [[zones]]
//! id = "platform-1"
//!
//! [[zones]]
//! id = "concourse"
//! gap_secs = 5
//!
//! [logging]
//! level = "info"
//! ```

use std::collections::HashSet;
use std::path::Path;

use announce_common::config::{
    load_toml_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR,
};
use chrono::Duration;
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::queue::QueueSettings;

/// Zone created at startup
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ZoneConfig {
    pub id: String,
    /// Overrides the engine-wide gap for this zone
    #[serde(default)]
    pub gap_secs: Option<u64>,
}

impl ZoneConfig {
    pub fn gap(&self) -> Option<Duration> {
        self.gap_secs.map(secs)
    }
}

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum silence between playbacks (seconds)
    pub gap_secs: u64,
    /// Finished events kept per queue
    pub memory: usize,
    /// Used when an announcement carries no audio duration (seconds)
    pub default_duration_secs: u64,
    /// Event bus channel capacity
    pub bus_capacity: usize,
    /// Initial volume of every zone (0.0-1.0)
    pub default_volume: f32,
    pub zones: Vec<ZoneConfig>,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gap_secs: 3,
            memory: 5,
            default_duration_secs: 90,
            bus_capacity: 1000,
            default_volume: 1.0,
            zones: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

fn secs(value: u64) -> Duration {
    let value = i64::try_from(value).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    Duration::seconds(value)
}

impl EngineConfig {
    /// Resolve, read and validate the config file
    ///
    /// Resolution order: `cli_path`, then `ANNOUNCE_CONFIG`, then the platform
    /// config directory, then built-in defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR);
        if let Some(path) = &path {
            info!("Loading configuration from {}", path.display());
        }
        let config: Self = load_toml_or_default(path.as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail later at runtime
    pub fn validate(&self) -> Result<()> {
        if self.bus_capacity == 0 {
            return Err(Error::Config("bus_capacity must be at least 1".to_string()));
        }
        if self.default_duration_secs == 0 {
            return Err(Error::Config(
                "default_duration_secs must be at least 1".to_string(),
            ));
        }
        if !self.default_volume.is_finite() {
            return Err(Error::Config(format!(
                "default_volume must be a number, got {}",
                self.default_volume
            )));
        }

        let mut seen = HashSet::new();
        for zone in &self.zones {
            if zone.id.trim().is_empty() {
                return Err(Error::Config("zone id must not be empty".to_string()));
            }
            if !seen.insert(zone.id.as_str()) {
                return Err(Error::Config(format!("duplicate zone id: {}", zone.id)));
            }
        }
        Ok(())
    }

    /// Queue parameters shared by every zone
    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            gap: secs(self.gap_secs),
            memory: self.memory,
            default_duration: secs(self.default_duration_secs),
            volume: self.default_volume.clamp(0.0, 1.0),
        }
    }
}
