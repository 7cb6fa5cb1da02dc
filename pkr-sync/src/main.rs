//! pkr-sync - Peaker form reconciliation
//!
//! Pulls the Peaker step/litter form responses from Google Sheets and:
//! - `dupes`: reports stuttered and double-counted submissions
//! - `correct`: writes a deduplicated, name-corrected master copy
//! - `split`: routes rows into one spreadsheet per group
//! - `tally`: counts litter answers per day

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use pkr_common::config::{load_config, ConfigOrigin, TomlConfig};
use pkr_common::registry::GroupRegistry;
use pkr_sync::{commands, SheetsClient};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pkr-sync
#[derive(Parser, Debug)]
#[command(name = "pkr-sync")]
#[command(about = "Reconcile Peaker form responses in Google Sheets")]
#[command(version)]
struct Args {
    /// Config file (overrides PKR_CONFIG and the per-user config)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct Limit {
    /// How many rows to process
    #[arg(short = 'c', long = "count")]
    count: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find places the form stuttered
    Dupes(Limit),
    /// Write corrected rows to the master spreadsheet
    Correct(Limit),
    /// Split rows into one spreadsheet per group
    Split {
        #[command(flatten)]
        limit: Limit,
        /// Only write these groups (repeatable); all groups when omitted
        #[arg(short = 'g', long = "group", value_name = "GROUP")]
        groups: Vec<String>,
    },
    /// Count how many peakers picked up trash per day
    Tally(Limit),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, origin) = load_config(args.config.as_deref()).context("Failed to load config")?;
    init_tracing(&config);
    info!("Starting pkr-sync v{}", env!("CARGO_PKG_VERSION"));
    if origin == ConfigOrigin::Defaults {
        warn!("No config file found, using compiled defaults");
    } else {
        info!("Config: {}", origin);
    }
    config.validate()?;

    info!("Connecting...");
    let mut sheets = SheetsClient::from_config(&config)?;
    info!("...connected");

    match args.command {
        Command::Dupes(limit) => {
            let report = commands::find_duplicates(&mut sheets, &config, limit.count).await?;
            println!("Saw {} possible duplicates", report.primary_duplicates);
            println!("Saw {} double counts", report.secondary_duplicates);
        }
        Command::Correct(limit) => {
            let summary = commands::write_corrected(&mut sheets, &config, limit.count).await?;
            println!(
                "Wrote {} corrected rows ({} duplicates dropped)",
                summary.kept_rows,
                summary.dropped_rows()
            );
        }
        Command::Split { limit, groups } => {
            let registry_path = config.registry_path();
            info!("Group registry: {}", registry_path.display());
            let mut registry = GroupRegistry::load(&registry_path)
                .with_context(|| format!("Failed to load {}", registry_path.display()))?;

            let report =
                commands::split_groups(&mut sheets, &config, &mut registry, limit.count, &groups)
                    .await?;
            registry.save()?;

            for group in &report.created {
                if let Some(entry) = registry.get(group) {
                    println!("New sheet {}: {}", group, entry.handle.url);
                }
            }
            println!(
                "Routed {} rows to {} groups ({} held back)",
                report.rows_written(),
                report.flushed.len(),
                report.held.len()
            );
        }
        Command::Tally(limit) => {
            let tally = commands::tally(&mut sheets, &config, limit.count).await?;
            print!("{tally}");
            println!("{} days", tally.len());
        }
    }

    Ok(())
}

/// RUST_LOG wins; otherwise the configured level applies to our crates
fn init_tracing(config: &TomlConfig) {
    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pkr_sync={level},pkr_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
