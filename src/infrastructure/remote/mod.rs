//! Remote service adapters
//!
//! Each remote service implements [`ServiceAdapter`]. The engines only ever
//! talk to services through this trait, looked up by [`Service`] in an
//! [`AdapterRegistry`].

pub mod furaffinity;
pub mod gate;
mod http;
pub mod weasyl;

use crate::domain::{Service, Submission, TagSet};
use crate::infrastructure::Config;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use furaffinity::FurAffinity;
pub use gate::{RateLimiter, RequestGate};
pub use weasyl::Weasyl;

/// Opaque continuation token returned by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of enumeration; `next` is `None` at the end
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub submissions: Vec<Submission>,
    pub next: Option<Cursor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Network, rate limit, timeout or server-side failure; worth retrying
    Transient,
    /// Authorization, not found or validation failure
    Permanent,
    /// The run was cancelled before the request was sent
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn transient(message: impl Into<String>) -> Self {
        RemoteError {
            kind: RemoteErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        RemoteError {
            kind: RemoteErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        RemoteError {
            kind: RemoteErrorKind::Cancelled,
            message: "cancelled before the request was sent".to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == RemoteErrorKind::Transient
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == RemoteErrorKind::Cancelled
    }
}

/// Capabilities the engines need from a remote service.
///
/// Implementations send every HTTP request through `gate`, so a call made of
/// several requests pays the request budget once per request.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn service(&self) -> Service;

    /// List one page of the user's submissions, starting at `cursor`
    /// (`None` for the first page). Safe to resume from any returned cursor.
    async fn enumerate(
        &self,
        gate: &RequestGate,
        cursor: Option<Cursor>,
    ) -> Result<Page, RemoteError>;

    /// View a single submission
    async fn fetch(&self, gate: &RequestGate, id: i64) -> Result<Submission, RemoteError>;

    /// Replace the submission's full tag set, returning the tags the
    /// service confirms
    async fn set_tags(
        &self,
        gate: &RequestGate,
        id: i64,
        tags: &TagSet,
    ) -> Result<TagSet, RemoteError>;
}

/// Adapters keyed by service
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Service, Arc<dyn ServiceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every service with credentials in `config`
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        let mut registry = AdapterRegistry::new();

        if let Some(weasyl) = &config.weasyl {
            registry.register(Arc::new(Weasyl::new(weasyl)?));
        }
        if let Some(furaffinity) = &config.furaffinity {
            registry.register(Arc::new(FurAffinity::new(furaffinity)?));
        }

        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn ServiceAdapter>) {
        self.adapters.insert(adapter.service(), adapter);
    }

    pub fn get(&self, service: Service) -> Option<Arc<dyn ServiceAdapter>> {
        self.adapters.get(&service).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ServiceAdapter>> {
        self.adapters.values()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::WeasylConfig;

    #[test]
    fn test_remote_error_kinds() {
        assert!(RemoteError::transient("503").is_transient());
        assert!(!RemoteError::permanent("404").is_transient());
        assert!(RemoteError::cancelled().is_cancelled());
        assert!(!RemoteError::cancelled().is_transient());
        assert_eq!(RemoteError::permanent("gone").to_string(), "gone");
    }

    #[test]
    fn test_registry_from_config_only_registers_configured() {
        let config = Config {
            weasyl: Some(WeasylConfig {
                user: "artist".to_string(),
                api_key: "key".to_string(),
            }),
            ..Config::default()
        };

        let registry = AdapterRegistry::from_config(&config).unwrap();
        assert!(registry.get(Service::Weasyl).is_some());
        assert!(registry.get(Service::FurAffinity).is_none());
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn test_empty_registry() {
        let registry = AdapterRegistry::from_config(&Config::default()).unwrap();
        assert!(registry.is_empty());
    }
}
