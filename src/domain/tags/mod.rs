//! Tag system

pub mod diff;
pub mod edit;
pub mod policy;
pub mod query;

// Re-export main types
pub use diff::{plan, Diff};
pub use edit::TagEdit;
pub use policy::{TagPolicy, TagSet};
pub use query::TagExpression;
