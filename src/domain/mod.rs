//! Domain layer - Submission model, tag queries, edits and diffs

pub mod submission;
pub mod tags;

pub use submission::{Service, Submission, SubmissionKey};
pub use tags::{plan, Diff, TagEdit, TagExpression, TagPolicy, TagSet};
