//! Configuration loading and config file resolution
//!
//! Bootstrap configuration is a TOML file. Missing files are not fatal:
//! callers fall back to built-in defaults and log a warning.
//!
//! # Resolution Priority
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/announce/config.toml`)
//! 4. None (built-in defaults)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "ANNOUNCE_CONFIG";

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve which config file to read
///
/// Returns `None` when neither an explicit path nor a platform default file exists.
/// An explicit path (CLI or environment) is returned even if it does not exist,
/// so the caller can report it.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|path| path.exists())
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("announce").join("config.toml"))
}

/// Parse a TOML document into `T`
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

/// Load a TOML config file, falling back to `T::default()` when it is absent
///
/// A file that exists but cannot be read or parsed is an error.
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    parse_toml(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Deserialize, Default, PartialEq)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_logging_defaults_to_info() {
        assert_eq!(LoggingConfig::default().level, "info");
    }

    #[test]
    #[serial]
    fn test_cli_argument_wins_over_env() {
        std::env::set_var("ANNOUNCE_TEST_CONFIG", "/tmp/from-env.toml");
        let resolved = resolve_config_path(
            Some(Path::new("/tmp/from-cli.toml")),
            "ANNOUNCE_TEST_CONFIG",
        );
        std::env::remove_var("ANNOUNCE_TEST_CONFIG");
        assert_eq!(resolved, Some(PathBuf::from("/tmp/from-cli.toml")));
    }

    #[test]
    #[serial]
    fn test_env_var_used_without_cli() {
        std::env::set_var("ANNOUNCE_TEST_CONFIG", "/tmp/from-env.toml");
        let resolved = resolve_config_path(None, "ANNOUNCE_TEST_CONFIG");
        std::env::remove_var("ANNOUNCE_TEST_CONFIG");
        assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));
    }

    #[test]
    fn test_missing_file_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let loaded: Sample = load_toml_or_default(Some(&missing)).unwrap();
        assert_eq!(loaded, Sample::default());

        let none: Sample = load_toml_or_default(None).unwrap();
        assert_eq!(none, Sample::default());
    }

    #[test]
    fn test_loads_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"north\"\n[logging]\nlevel = \"debug\"").unwrap();

        let loaded: Sample = load_toml_or_default(Some(file.path())).unwrap();
        assert_eq!(loaded.name, "north");
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = [unterminated").unwrap();

        let result: Result<Sample> = load_toml_or_default(Some(file.path()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_toml_reports_syntax_error() {
        let result: Result<Sample> = parse_toml("name = [unterminated");
        assert!(matches!(result, Err(Error::Toml(_))));

        let parsed: Sample = parse_toml("name = \"south\"").unwrap();
        assert_eq!(parsed.name, "south");
    }
}
