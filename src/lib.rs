//! # mtlsgate
//!
//! Issues short-lived mTLS client certificates to holders of a preshared
//! secret, signed by a local CA and delivered as a password-less PKCS#12
//! bundle.
//!
//! ## Architecture
//!
//! ```text
//! HTTP form → IssuanceOrchestrator → ClientDirectory
//!                    ↓
//!              with_scope ──→ CertificateSigner → BundlePackager
//!                                   ↓                  ↓
//!                          CertificateAuthority (openssl | native)
//! ```
//!
//! Key material only ever lives inside a [`pki::ResourceScope`], which is
//! removed when issuance finishes, fails or is cancelled.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mtlsgate::{config::AppConfig, services::build_orchestrator, services::IssuanceOutcome};
//!
//! #[tokio::main]
//! async fn main() -> mtlsgate::Result<()> {
//!     let config = AppConfig::load(None)?;
//!     let orchestrator = build_orchestrator(&config);
//!     if let IssuanceOutcome::Packaged { filename, .. } =
//!         orchestrator.issue_for_secret("secret").await
//!     {
//!         println!("issued {filename}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod directory;
pub mod errors;
pub mod observability;
pub mod pki;
pub mod services;

pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
