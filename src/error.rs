//! Error types for retagger

use crate::domain::Service;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for retagger
#[derive(Debug, Error)]
pub enum RetaggerError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Submission not found: {service}-{id}")]
    NotFound { service: Service, id: i64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No services configured")]
    NoServices,

    #[error("Sync failed for: {}", services.join(", "))]
    SyncFailed { services: Vec<String> },

    #[error("{failed} of {total} submission(s) failed to update")]
    PartialFailure { failed: usize, total: usize },

    #[error("Cancelled")]
    Cancelled,
}

impl RetaggerError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RetaggerError::Parse(_) => 2,
            RetaggerError::Store(_)
            | RetaggerError::Encoding(_)
            | RetaggerError::Io(_)
            | RetaggerError::NotFound { .. } => 3,
            RetaggerError::SyncFailed { .. } | RetaggerError::PartialFailure { .. } => 4,
            RetaggerError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Whether this error is a local persistence failure
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            RetaggerError::Store(_) | RetaggerError::Encoding(_) | RetaggerError::Io(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn display_with_suggestions(&self) -> String {
        match self {
            RetaggerError::Parse(msg) => {
                format!(
                    "Parse error: {}\n\n\
                    Tag syntax:\n\
                    • Separate tags with spaces\n\
                    • Prefix a tag with '-' to exclude (search) or remove (edit) it\n\
                    • An optional '+' prefix marks a tag to require or add\n\n\
                    Examples:\n\
                    retagger query-tags --search \"dragon -sketch\"\n\
                    retagger apply-tags --search \"dragon\" --tags \"+scalie -wip\"",
                    msg
                )
            }
            RetaggerError::ConfigNotFound(path) => {
                format!(
                    "Config file not found: {}\n\n\
                    Suggestions:\n\
                    • Run 'retagger init' to write a default retagger.toml\n\
                    • Pass --config with the path to an existing file\n\
                    • Set RETAGGER_CONFIG to your config path",
                    path.display()
                )
            }
            RetaggerError::NoServices => "No services configured\n\n\
                Suggestions:\n\
                • Add a [weasyl] section with user and api_key to retagger.toml\n\
                • Add a [furaffinity] section with user, cookie_a and cookie_b"
                .to_string(),
            RetaggerError::Config(msg) if msg.contains("dispatch") => {
                format!(
                    "{}\n\n\
                    Dispatch settings must be positive, for example:\n\
                    [dispatch]\n\
                    concurrency = 4\n\
                    requests_per_period = 10\n\
                    period_ms = 1000",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Result type using RetaggerError
pub type Result<T> = std::result::Result<T, RetaggerError>;
