//! Output formatting for CLI commands

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crate::pki::CaInfo;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Render CA metadata as aligned `field  value` rows; absent fields show `-`.
pub fn ca_info_table(info: &CaInfo) -> String {
    let rows = [
        ("Country", info.country.as_deref()),
        ("State", info.state.as_deref()),
        ("Locality", info.locality.as_deref()),
        ("Organization", info.organization.as_deref()),
        ("Email", info.email_address.as_deref()),
    ];

    let mut table = String::new();
    for (field, value) in rows {
        table.push_str(&format!("{:<14}{}\n", field, value.unwrap_or("-")));
    }
    table.push_str(&format!("{:<14}{}\n", "Not after", info.not_after.to_rfc3339()));
    table
}

pub fn print_ca_info(info: &CaInfo, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(info),
        OutputFormat::Table => {
            print!("{}", ca_info_table(info));
            Ok(())
        }
    }
}
