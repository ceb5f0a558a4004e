//! Infrastructure layer - External I/O and persistence

pub mod config;
pub mod remote;
pub mod store;

pub use config::Config;
pub use remote::{AdapterRegistry, RemoteError, ServiceAdapter};
pub use store::SubmissionStore;
