//! # Command Line Interface
//!
//! Runs the issuance server, issues a bundle for an identity without a
//! directory lookup, and inspects the configured CA.

pub mod output;

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::api::{start_api_server, ApiState};
use crate::config::AppConfig;
use crate::observability::{init_logging, init_observability, log_config_info};
use crate::pki::{build_authority, extract_ca_data};
use crate::services::build_orchestrator;
use crate::{APP_NAME, VERSION};

use output::{print_ca_info, OutputFormat};

/// Warn at startup when the CA expires within this many days.
const CA_EXPIRY_WARNING_DAYS: i64 = 30;

#[derive(Parser)]
#[command(name = "mtlsgate")]
#[command(about = "Short-lived mTLS client certificate issuance")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML); environment variables override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the issuance form and bundle download
    Serve,

    /// Issue a bundle for a client identity and write it to disk
    Issue {
        /// Client email placed in the certificate subject
        #[arg(long)]
        email: String,

        /// Display name used as the bundle's friendly name
        #[arg(long)]
        name: String,

        /// Output path (defaults to `<name>.pfx` in the current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the subject fields and expiry of the configured CA
    InspectCa {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Issue { email, name, out } => {
            init_logging(&config.observability)?;
            issue(&config, &name, &email, out).await
        }
        Commands::InspectCa { output } => {
            init_logging(&config.observability)?;
            inspect_ca(&config, output).await
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    init_observability(&config.observability).await?;
    info!(app_name = APP_NAME, version = VERSION, "Starting mtlsgate");
    log_config_info(&config);

    check_ca(&config).await;

    let orchestrator = build_orchestrator(&config);
    info!(backend = orchestrator.backend(), "Issuance orchestrator ready");

    start_api_server(&config.server, ApiState::new(orchestrator)).await?;
    Ok(())
}

/// Log CA problems at startup without refusing to serve; issuance reports them per request.
async fn check_ca(config: &AppConfig) {
    let authority = build_authority(&config.ca);
    match extract_ca_data(authority.as_ref(), &config.ca.cert_path).await {
        Ok(info) => {
            let remaining = info.not_after - Utc::now();
            if remaining <= Duration::zero() {
                warn!(not_after = %info.not_after, "CA certificate has expired; issuance will fail");
            } else if remaining < Duration::days(CA_EXPIRY_WARNING_DAYS) {
                warn!(not_after = %info.not_after, "CA certificate expires soon");
            } else {
                info!(not_after = %info.not_after, "CA certificate loaded");
            }
        }
        Err(e) => warn!(error = %e, "Unable to read CA certificate; issuance will fail"),
    }
}

async fn issue(
    config: &AppConfig,
    name: &str,
    email: &str,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config);
    let (bundle, filename) = orchestrator
        .issue_for_identity(name, email)
        .await
        .with_context(|| format!("Failed to issue a bundle for {email}"))?;

    let out = out.unwrap_or_else(|| PathBuf::from(filename));
    write_bundle(&out, &bundle).await?;
    println!("Wrote {} ({} bytes)", out.display(), bundle.len());
    Ok(())
}

/// Write a bundle that does not exist yet, readable by the owner only.
async fn write_bundle(path: &Path, bundle: &[u8]) -> anyhow::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(bundle).await?;
    file.flush().await?;
    Ok(())
}

async fn inspect_ca(config: &AppConfig, output: OutputFormat) -> anyhow::Result<()> {
    let authority = build_authority(&config.ca);
    let info = extract_ca_data(authority.as_ref(), &config.ca.cert_path)
        .await
        .with_context(|| format!("Failed to read {}", config.ca.cert_path.display()))?;
    print_ca_info(&info, output)
}
