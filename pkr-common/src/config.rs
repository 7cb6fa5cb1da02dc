//! Configuration loading
//!
//! Config file resolution priority:
//! 1. Command-line `--config <path>` (highest priority)
//! 2. `PKR_CONFIG` environment variable
//! 3. `<config_dir>/peaker/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! An explicitly named file (1 or 2) must exist and parse. The per-user
//! file (3) is optional: when absent, compiled defaults apply.

use crate::split::DEFAULT_TIME_CELL;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PKR_CONFIG";

/// Form responses and alias sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub spreadsheet_id: String,
    pub range: String,
    /// Spreadsheet holding the alias sheet; the source spreadsheet when unset
    pub alias_spreadsheet_id: Option<String>,
    /// No aliases are applied when unset
    pub alias_range: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            range: "Form Responses 1!A:F".to_string(),
            alias_spreadsheet_id: None,
            alias_range: None,
        }
    }
}

impl SourceConfig {
    pub fn alias_spreadsheet_id(&self) -> &str {
        self.alias_spreadsheet_id
            .as_deref()
            .unwrap_or(&self.spreadsheet_id)
    }
}

/// Destinations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Master destination for corrected rows
    pub corrected_spreadsheet_id: Option<String>,
    /// Group registry snapshot; see [`default_registry_path`]
    pub registry_path: Option<PathBuf>,
    /// Side cell stamped with the time of data
    pub time_cell: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            corrected_spreadsheet_id: None,
            registry_path: None,
            time_cell: DEFAULT_TIME_CELL.to_string(),
        }
    }
}

/// Minimum spacing between sink mutations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub mutation_delay_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            mutation_delay_ms: 1500,
        }
    }
}

/// Retry policy for transient collaborator failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first; 1 disables retry
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Environment variable holding the OAuth access token
    pub access_token_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_env: "PEAKER_ACCESS_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Whole config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub throttle: ThrottleConfig,
    pub retry: RetryConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Registry snapshot path, falling back to the platform data directory
    pub fn registry_path(&self) -> PathBuf {
        self.output
            .registry_path
            .clone()
            .unwrap_or_else(default_registry_path)
    }

    /// Reject settings the run cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.source.spreadsheet_id.trim().is_empty() {
            return Err(Error::Config("source.spreadsheet_id is not set".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        crate::sink::parse_cell(&self.output.time_cell)?;
        Ok(())
    }
}

/// Where the config came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    CommandLine(PathBuf),
    Environment(PathBuf),
    UserFile(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigOrigin::CommandLine(path) => write!(f, "{} (command line)", path.display()),
            ConfigOrigin::Environment(path) => write!(f, "{} ({})", path.display(), CONFIG_ENV_VAR),
            ConfigOrigin::UserFile(path) => write!(f, "{}", path.display()),
            ConfigOrigin::Defaults => write!(f, "compiled defaults"),
        }
    }
}

/// Resolve and load the config following the priority order above
///
/// Runs before logging is initialised, so it reports where the config came
/// from instead of logging it.
pub fn load_config(cli_path: Option<&Path>) -> Result<(TomlConfig, ConfigOrigin)> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        let config = TomlConfig::from_file(path)?;
        return Ok((config, ConfigOrigin::CommandLine(path.to_path_buf())));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            let path = PathBuf::from(path);
            let config = TomlConfig::from_file(&path)?;
            return Ok((config, ConfigOrigin::Environment(path)));
        }
    }

    // Priority 3: Per-user config file
    if let Some(path) = user_config_path() {
        if path.exists() {
            let config = TomlConfig::from_file(&path)?;
            return Ok((config, ConfigOrigin::UserFile(path)));
        }
    }

    // Priority 4: Compiled defaults
    Ok((TomlConfig::default(), ConfigOrigin::Defaults))
}

/// `<config_dir>/peaker/config.toml`, if the platform has a config dir
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("peaker").join("config.toml"))
}

/// `<data_local_dir>/peaker/group_sheets.json`, or `./group_sheets.json`
pub fn default_registry_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("peaker").join("group_sheets.json"))
        .unwrap_or_else(|| PathBuf::from("group_sheets.json"))
}
