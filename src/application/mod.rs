//! Application layer - Use cases and orchestration

pub mod apply_tags;
pub mod dispatch;
pub mod init;
pub mod load_submissions;
pub mod query_tags;

pub use apply_tags::{ApplyEngine, ApplyOptions, ApplyOutcome, ApplyReport, SubmissionState};
pub use dispatch::{RetryPolicy, ServiceDispatcher};
pub use load_submissions::{ServiceSyncReport, SyncEngine, SyncReport, SyncStatus};
pub use query_tags::QueryService;
