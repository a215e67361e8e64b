use anyhow::Result;
use clap::{Parser, Subcommand};
use cynhn_cal::pipeline::{InspectOptions, SyncOptions, inspect_calendar, sync_calendar, validate_config};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cynhn-cal", about = "Unofficial CYNHN schedule to iCalendar")]
struct Cli {
    /// TOML config; built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrape the site and append this run's calendar to the output file.
    Sync {
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    Validate,
    /// Summarise an output file, including events repeated across runs.
    Inspect {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            output,
            year,
            month,
            dry_run,
        } => {
            let report = sync_calendar(&SyncOptions {
                config_path: cli.config,
                output,
                year,
                month,
                dry_run,
            })?;

            info!(
                links = report.links_found,
                fetched = report.pages_fetched,
                built = report.records_built,
                accepted = report.accepted,
                duplicates = report.duplicates,
                excluded = report.excluded,
                failed = report.failed,
                recurring = report.recurring,
                written = report.events_written,
                "sync summary"
            );
        }
        Commands::Validate => {
            for line in validate_config(cli.config.as_deref())? {
                println!("{line}");
            }
        }
        Commands::Inspect { path } => {
            let report = inspect_calendar(&InspectOptions {
                config_path: cli.config,
                path,
            })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}
