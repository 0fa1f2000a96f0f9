//! Configuration management
//!
//! Optional TOML file; every field has a default so an empty or missing
//! file yields a working logger.
//!
//! ```toml
//! [logs]
//! dir = "logs"
//! time_format = "%x %X"
//! default_level = ["info", "warning", "error", "fatal"]
//!
//! [logs.levels]
//! "plugins/mysql" = ["debug", "info", "warning", "error", "fatal"]
//!
//! [crash]
//! enabled = true
//! module = "crash"
//! block_on_fatal = true
//! flush_timeout_ms = 2000
//! ```

use crate::constants::{
    DEFAULT_CRASH_MODULE, DEFAULT_FATAL_FLUSH_TIMEOUT_MS, DEFAULT_LOG_DIR, DEFAULT_TIME_FORMAT,
};
use crate::error::{LogError, Result};
use crate::logging::{validate_module_name, LevelMask, TimestampFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

// =============================================================================
// Application Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logs: LogsConfig,
    pub crash: CrashConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Root directory for module files and aggregates
    pub dir: PathBuf,
    /// strftime template for the line timestamp
    pub time_format: String,
    /// Level mask given to modules without an entry in `levels`
    pub default_level: LevelMask,
    /// Per-module level masks applied at registration
    pub levels: BTreeMap<String, LevelMask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    /// Install fault hooks on service init
    pub enabled: bool,
    /// Module receiving fault records
    pub module: String,
    /// Wait for the fault record to reach disk before default handling
    pub block_on_fatal: bool,
    /// Upper bound for that wait
    pub flush_timeout_ms: u64,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            default_level: LevelMask::default(),
            levels: BTreeMap::new(),
        }
    }
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            module: DEFAULT_CRASH_MODULE.to_string(),
            block_on_fatal: true,
            flush_timeout_ms: DEFAULT_FATAL_FLUSH_TIMEOUT_MS,
        }
    }
}

impl LogsConfig {
    /// Level mask a newly registered module starts with
    pub fn level_for(&self, module: &str) -> LevelMask {
        self.levels
            .get(module)
            .copied()
            .unwrap_or(self.default_level)
    }
}

impl CrashConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl Config {
    /// Check values that would otherwise only fail once the writer runs
    pub fn validate(&self) -> Result<TimestampFormat> {
        if self.logs.dir.as_os_str().is_empty() {
            return Err(LogError::ConfigValidation {
                field: "logs.dir",
                reason: "must not be empty".into(),
            });
        }
        if self.crash.enabled {
            if let Err(e) = validate_module_name(&self.crash.module) {
                return Err(LogError::ConfigValidation {
                    field: "crash.module",
                    reason: e.to_string(),
                });
            }
        }
        TimestampFormat::parse(&self.logs.time_format)
    }
}

/// Parse config from a TOML string
pub fn from_toml_str(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| LogError::ConfigValidation {
        field: "config",
        reason: e.to_string(),
    })
}

/// Load config from file
pub fn load(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| LogError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    from_toml_str(&content)
}

/// Load config from file, falling back to defaults on any problem
pub fn load_or_default(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }
    match load(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Config error in {:?}: {}, using defaults", path, e);
            Config::default()
        }
    }
}

/// Save config to file
pub fn save(config: &Config, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).map_err(|e| LogError::ConfigValidation {
        field: "config",
        reason: e.to_string(),
    })?;
    fs::write(path, content).map_err(|e| LogError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

// ============================================================================
// Tests
// ============================================================================
