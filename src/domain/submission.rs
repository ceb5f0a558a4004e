//! Submission model

use crate::domain::tags::{TagPolicy, TagSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Remote service hosting a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Service {
    FurAffinity,
    Weasyl,
}

impl Service {
    pub const ALL: [Service; 2] = [Service::FurAffinity, Service::Weasyl];

    /// Stable name used in the store and in output
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::FurAffinity => "FurAffinity",
            Service::Weasyl => "Weasyl",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "furaffinity" => Ok(Service::FurAffinity),
            "weasyl" => Ok(Service::Weasyl),
            _ => Err(format!(
                "Unknown service: '{}'. Valid services: FurAffinity, Weasyl",
                s
            )),
        }
    }
}

/// Primary key of a stored submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionKey {
    pub service: Service,
    pub id: i64,
}

impl fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.service, self.id)
    }
}

/// A single remote work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub service: Service,
    pub id: i64,
    pub title: String,
    pub posted_at: DateTime<Utc>,
    pub tags: TagSet,
}

impl Submission {
    pub fn key(&self) -> SubmissionKey {
        SubmissionKey {
            service: self.service,
            id: self.id,
        }
    }

    /// Copy of this submission carrying a replacement tag set
    pub fn with_tags(&self, tags: TagSet) -> Self {
        Submission {
            tags,
            ..self.clone()
        }
    }

    /// Normalize tags as they enter the store
    pub fn normalized(mut self, policy: TagPolicy) -> Self {
        self.tags = policy.normalize_set(self.tags.iter());
        self
    }
}
