//! HTTP handlers

pub mod bundle;
pub mod health;

pub use bundle::{index_handler, issue_bundle_handler, IssueForm};
pub use health::health_handler;
