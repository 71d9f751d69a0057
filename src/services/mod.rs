//! Business logic services
//!
//! Service layer components that encapsulate issuance logic, separated from
//! HTTP concerns.

pub mod issuance;

pub use issuance::{
    build_orchestrator, IssuanceOrchestrator, IssuanceOutcome, DENIED_MESSAGE, FAILED_REASON,
};
