//! Tag query parsing and evaluation
//!
//! A query is a whitespace-separated list of tags. Every tag must be present
//! on a submission, except tags prefixed with `-`, which must be absent.
//!
//! # Examples
//!
//! ```
//! use retagger::domain::tags::{TagExpression, TagPolicy};
//!
//! let query = TagExpression::parse("dragon -sketch", TagPolicy::default()).unwrap();
//! let tags = ["dragon".to_string(), "color".to_string()].into_iter().collect();
//! assert!(query.matches(&tags));
//! ```

use crate::domain::tags::{TagPolicy, TagSet};
use crate::error::{RetaggerError, Result};
use std::fmt;

/// A single signed tag token
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Atom {
    Include(String),
    Exclude(String),
}

/// Split input into signed, normalized tags.
///
/// `+tag` and `tag` are both positive; `-tag` is negative. A sign with no
/// tag after it is rejected.
pub(crate) fn parse_atoms(input: &str, policy: TagPolicy) -> Result<Vec<Atom>> {
    let mut atoms = Vec::new();

    for word in input.split_whitespace() {
        let (negative, raw) = match word.chars().next() {
            Some('-') => (true, &word[1..]),
            Some('+') => (false, &word[1..]),
            _ => (false, word),
        };

        let tag = policy.normalize(raw).ok_or_else(|| {
            RetaggerError::Parse(format!("Missing tag after '{}'", &word[..1]))
        })?;

        if negative {
            atoms.push(Atom::Exclude(tag));
        } else {
            atoms.push(Atom::Include(tag));
        }
    }

    Ok(atoms)
}

/// Parsed boolean tag predicate (implicit AND of all atoms)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagExpression {
    required: TagSet,
    excluded: TagSet,
}

impl TagExpression {
    /// Parse a query string.
    ///
    /// An empty query matches every submission.
    ///
    /// # Examples
    ///
    /// ```
    /// use retagger::domain::tags::{TagExpression, TagPolicy};
    ///
    /// assert!(TagExpression::parse("", TagPolicy::default()).is_ok());
    /// assert!(TagExpression::parse("good -", TagPolicy::default()).is_err());
    /// ```
    pub fn parse(query: &str, policy: TagPolicy) -> Result<Self> {
        let mut expression = TagExpression::default();

        for atom in parse_atoms(query, policy)? {
            match atom {
                Atom::Include(tag) => {
                    expression.required.insert(tag);
                }
                Atom::Exclude(tag) => {
                    expression.excluded.insert(tag);
                }
            }
        }

        Ok(expression)
    }

    /// Evaluate against a set of already-normalized tags
    pub fn matches(&self, tags: &TagSet) -> bool {
        self.required.iter().all(|tag| tags.contains(tag))
            && !self.excluded.iter().any(|tag| tags.contains(tag))
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.excluded.is_empty()
    }

    pub fn required(&self) -> &TagSet {
        &self.required
    }

    pub fn excluded(&self) -> &TagSet {
        &self.excluded
    }
}

impl fmt::Display for TagExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .required
            .iter()
            .cloned()
            .chain(self.excluded.iter().map(|tag| format!("-{}", tag)))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}
