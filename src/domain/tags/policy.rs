//! Tag normalization policy

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A submission's tags. Order is irrelevant; the sorted set keeps output stable.
pub type TagSet = BTreeSet<String>;

/// How tag strings are normalized before they are stored or compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPolicy {
    pub case_sensitive: bool,
}

impl TagPolicy {
    pub fn case_sensitive() -> Self {
        TagPolicy {
            case_sensitive: true,
        }
    }

    /// Trim and (unless case sensitive) lowercase a tag.
    ///
    /// Returns `None` when nothing is left.
    pub fn normalize(&self, tag: &str) -> Option<String> {
        let tag = tag.trim();
        if tag.is_empty() {
            return None;
        }

        if self.case_sensitive {
            Some(tag.to_string())
        } else {
            Some(tag.to_lowercase())
        }
    }

    pub fn normalize_set<'a, I>(&self, tags: I) -> TagSet
    where
        I: IntoIterator<Item = &'a String>,
    {
        tags.into_iter()
            .filter_map(|tag| self.normalize(tag))
            .collect()
    }
}
