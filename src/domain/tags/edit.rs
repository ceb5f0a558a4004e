//! Tag edit instructions

use crate::domain::tags::query::{parse_atoms, Atom};
use crate::domain::tags::{TagPolicy, TagSet};
use crate::error::{RetaggerError, Result};

/// Tags to add and tags to remove, parsed from `+tag -tag` syntax
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagEdit {
    add: TagSet,
    remove: TagSet,
}

impl TagEdit {
    /// Parse an edit string such as `"new -old"`.
    ///
    /// # Errors
    ///
    /// Returns a parse error if:
    /// - A `-` or `+` has no tag after it
    /// - The edit contains no tags
    /// - A tag is both added and removed
    pub fn parse(edit: &str, policy: TagPolicy) -> Result<Self> {
        let mut parsed = TagEdit::default();

        for atom in parse_atoms(edit, policy)? {
            match atom {
                Atom::Include(tag) => {
                    parsed.add.insert(tag);
                }
                Atom::Exclude(tag) => {
                    parsed.remove.insert(tag);
                }
            }
        }

        if parsed.add.is_empty() && parsed.remove.is_empty() {
            return Err(RetaggerError::Parse("No tag changes given".to_string()));
        }

        let conflicts: Vec<&str> = parsed
            .add
            .intersection(&parsed.remove)
            .map(String::as_str)
            .collect();
        if !conflicts.is_empty() {
            return Err(RetaggerError::Parse(format!(
                "Tags both added and removed: {}",
                conflicts.join(", ")
            )));
        }

        Ok(parsed)
    }

    pub fn add(&self) -> &TagSet {
        &self.add
    }

    pub fn remove(&self) -> &TagSet {
        &self.remove
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_and_remove() {
        let edit = TagEdit::parse("new -old +also", TagPolicy::default()).unwrap();
        assert_eq!(
            edit.add().iter().cloned().collect::<Vec<_>>(),
            vec!["also".to_string(), "new".to_string()]
        );
        assert_eq!(
            edit.remove().iter().cloned().collect::<Vec<_>>(),
            vec!["old".to_string()]
        );
    }

    #[test]
    fn test_conflicting_tag_rejected() {
        let result = TagEdit::parse("keep -keep", TagPolicy::default());
        match result {
            Err(RetaggerError::Parse(msg)) => assert!(msg.contains("keep")),
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_conflict_detected_after_case_folding() {
        assert!(TagEdit::parse("Keep -keep", TagPolicy::default()).is_err());
        assert!(TagEdit::parse("Keep -keep", TagPolicy::case_sensitive()).is_ok());
    }

    #[test]
    fn test_empty_edit_rejected() {
        assert!(TagEdit::parse("  ", TagPolicy::default()).is_err());
    }

    #[test]
    fn test_lone_minus_rejected() {
        assert!(TagEdit::parse("new -", TagPolicy::default()).is_err());
    }
}
