#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for CNPJ archive acquisition.
//!
//! Uses `indicatif-log-bridge` (via [`cnpj_getter_cli_utils::init_logger`])
//! so log lines and per-month progress bars share the terminal.

mod config;

use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use cnpj_getter_acquire::downloader::Downloader;
use cnpj_getter_acquire::finder::MonthFinder;
use cnpj_getter_acquire::webdav::{HttpWebDav, WebDav};
use cnpj_getter_acquire_models::{AcquireConfig, Month};
use cnpj_getter_cli_utils::{IndicatifProgress, MultiProgress};

#[derive(Parser)]
#[command(name = "cnpj_getter", about = "CNPJ open data acquisition tool")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration (token masked)
    Info,
    /// List month folders modified within the recency window
    Months {
        /// Recency window in days (overrides `CNPJ_WINDOW_DAYS`)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        window_days: Option<u32>,
        /// Print a JSON array instead of one month per line
        #[arg(long)]
        json: bool,
    },
    /// Download every relevant archive of one or more months.
    /// Without `--month` or `--previous-month`, downloads every month
    /// modified within the recency window.
    Download {
        /// Month to download (e.g., "2024-05"). May be repeated.
        #[arg(long = "month")]
        months: Vec<Month>,
        /// Download the month before the current one
        #[arg(long, conflicts_with = "months")]
        previous_month: bool,
        /// Recency window in days when discovering months
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        window_days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = cnpj_getter_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = config::from_env()?;

    match cli.command.unwrap_or(Commands::Info) {
        Commands::Info => print_info(&config),
        Commands::Months { window_days, json } => {
            if let Some(days) = window_days {
                config.window_days = days;
            }
            let dav: Arc<dyn WebDav> = Arc::new(HttpWebDav::new(&config)?);
            let months = MonthFinder::new(&config, dav)
                .discover_updated_months()
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&months)?);
            } else if months.is_empty() {
                println!("No months updated in the last {} days.", config.window_days);
            } else {
                for month in &months {
                    println!("{month}");
                }
            }
        }
        Commands::Download {
            months,
            previous_month,
            window_days,
        } => {
            if let Some(days) = window_days {
                config.window_days = days;
            }
            download(&config, &multi, months, previous_month).await?;
        }
    }

    Ok(())
}

fn print_info(config: &AcquireConfig) {
    println!("{:<16} {}", "webdav", config.base_url);
    println!("{:<16} {}", "token", config::mask_token(&config.token));
    println!("{:<16} {}", "root", config.root_path);
    println!("{:<16} {}", "raw dir", config.raw_dir.display());
    println!("{:<16} {}", "workers", config.workers);
    println!("{:<16} {} days", "window", config.window_days);
    println!("{:<16} {}", "max rounds", config.max_rounds);
}

async fn download(
    config: &AcquireConfig,
    multi: &MultiProgress,
    months: Vec<Month>,
    previous_month: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let dav: Arc<dyn WebDav> = Arc::new(HttpWebDav::new(config)?);

    let months = if !months.is_empty() {
        months
    } else if previous_month {
        vec![Month::preceding(chrono::Local::now().date_naive())]
    } else {
        MonthFinder::new(config, dav.clone())
            .discover_updated_months()
            .await?
    };

    if months.is_empty() {
        log::info!("Nothing to download.");
        return Ok(());
    }

    let start = Instant::now();

    for month in &months {
        let progress = IndicatifProgress::files_bar(multi, month.as_str());
        let result = Downloader::new(config, dav.clone())
            .with_progress(progress)
            .download_month(month)
            .await?;

        println!(
            "{month}: {} downloaded, {} skipped",
            result.downloaded.len(),
            result.skipped.len()
        );
    }

    log::info!(
        "{} month(s) complete in {:.1}s",
        months.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
