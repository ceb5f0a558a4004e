//! retagger - Bulk tag editing for FurAffinity and Weasyl submissions
//!
//! Mirrors submission metadata into a local SQLite store, selects submissions
//! with boolean tag queries and pushes tag edits back to the services.

pub mod application;
pub mod cli;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::RetaggerError;
