//! Configuration management

use crate::domain::TagPolicy;
use crate::error::{RetaggerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "retagger.toml";
pub const CONFIG_ENV_VAR: &str = "RETAGGER_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding mirrored submissions
    pub database: PathBuf,
    pub case_sensitive: bool,
    pub dispatch: DispatchConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weasyl: Option<WeasylConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub furaffinity: Option<FurAffinityConfig>,
}

/// Per-service dispatch limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub concurrency: usize,
    pub requests_per_period: u32,
    pub period_ms: u64,
    pub call_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeasylConfig {
    pub user: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FurAffinityConfig {
    pub user: String,
    pub cookie_a: String,
    pub cookie_b: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: PathBuf::from("submissions.db"),
            case_sensitive: false,
            dispatch: DispatchConfig::default(),
            weasyl: None,
            furaffinity: None,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            concurrency: 4,
            requests_per_period: 10,
            period_ms: 1000,
            call_timeout_secs: 30,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
        }
    }
}

impl DispatchConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Config {
    /// Resolve and load the config file.
    ///
    /// An explicit path (argument or `RETAGGER_CONFIG`) must exist; the
    /// default `./retagger.toml` falls back to built-in defaults when absent.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }

        let default_path = std::env::current_dir()?.join(CONFIG_FILE_NAME);
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            log::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
            Ok(Config::default())
        }
    }

    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RetaggerError::ConfigNotFound(path.to_path_buf())
            } else {
                RetaggerError::Io(e)
            }
        })?;

        let mut config: Config = toml::from_str(&contents).map_err(|e| {
            RetaggerError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        // Relative database paths are relative to the config file
        if config.database.is_relative() {
            if let Some(dir) = path.parent() {
                config.database = dir.join(&config.database);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let dispatch = &self.dispatch;
        let checks = [
            ("dispatch.concurrency", dispatch.concurrency as u64),
            (
                "dispatch.requests_per_period",
                dispatch.requests_per_period as u64,
            ),
            ("dispatch.period_ms", dispatch.period_ms),
            ("dispatch.max_attempts", dispatch.max_attempts as u64),
        ];

        for (name, value) in checks {
            if value == 0 {
                return Err(RetaggerError::Config(format!(
                    "{} must be positive",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn tag_policy(&self) -> TagPolicy {
        TagPolicy {
            case_sensitive: self.case_sensitive,
        }
    }
}
