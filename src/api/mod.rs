//! # HTTP API
//!
//! The issuance form, bundle download and health probe, served with axum.

pub mod handlers;
pub mod routes;
pub mod server;

pub use routes::{build_router, ApiState};
pub use server::start_api_server;
