//! Diff planning
//!
//! `plan` is the only place a symbolic [`TagEdit`] becomes concrete tag
//! changes for one submission.

use crate::domain::tags::{TagEdit, TagSet};
use crate::domain::Submission;

/// Minimal change needed to realize an edit on one submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub add: TagSet,
    pub remove: TagSet,
}

impl Diff {
    /// An empty diff needs no remote call
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Full tag set after applying this diff: `(current - remove) + add`
    pub fn apply_to(&self, current: &TagSet) -> TagSet {
        current
            .difference(&self.remove)
            .chain(self.add.iter())
            .cloned()
            .collect()
    }
}

/// Compute the diff for `edit` against the submission's current tags.
pub fn plan(submission: &Submission, edit: &TagEdit) -> Diff {
    Diff {
        add: edit.add().difference(&submission.tags).cloned().collect(),
        remove: edit
            .remove()
            .intersection(&submission.tags)
            .cloned()
            .collect(),
    }
}
