//! # Configuration Management
//!
//! Layered loading: built-in defaults, then an optional TOML file, then
//! `MTLSGATE__SECTION__KEY` environment variables. The result is validated
//! before anything uses it and is passed explicitly to the components that
//! need it.

pub mod settings;

use std::path::Path;

use tracing::debug;

use crate::errors::Result;

pub use settings::{
    AppConfig, CaBackend, CaConfig, DirectoryConfig, IssuanceConfig, ObservabilityConfig,
    ServerConfig,
};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "MTLSGATE";

/// Separator between prefix, section and key in environment overrides.
pub const ENV_SEPARATOR: &str = "__";

impl AppConfig {
    /// Load configuration from defaults, `path` (if given and present) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load_from(path: Option<&Path>, environment: config::Environment) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let loaded: AppConfig = builder
            .add_source(environment.separator(ENV_SEPARATOR).try_parsing(true))
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }
}
