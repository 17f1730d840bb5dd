// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tally - usage metering, quota checks and cached usage reports.
//!
//! This is the binary entry point for the `tally` command.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod doctor;
mod output;
mod services;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tally_config::TallyConfig;
use tally_core::{ReportWindow, TallyError};

use crate::services::Services;

/// Tally - usage metering, quota checks and cached usage reports.
#[derive(Parser, Debug)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Price one model interaction and append it to the ledger.
    Record {
        user: String,
        model: String,
        input_tokens: u64,
        output_tokens: u64,
        /// Request category tag (default: text-completion).
        #[arg(long)]
        category: Option<String>,
    },
    /// Check a user's quota. Exits with status 2 when the request would be denied.
    Quota {
        user: String,
        /// Print the decision as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Summarize usage over a trailing window.
    Report {
        /// day, week or month.
        #[arg(long, default_value = "day", value_parser = parse_window)]
        window: ReportWindow,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
        /// Skip the cache and recompute.
        #[arg(long)]
        no_cache: bool,
    },
    /// Run health checks over configuration, storage and cache.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

fn parse_window(tag: &str) -> Result<ReportWindow, String> {
    ReportWindow::parse_strict(tag).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => tally_config::load_and_validate_path(path),
        None => tally_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            tally_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level);

    let code = match run(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    std::process::exit(code);
}

/// Run one command, returning the process exit status.
async fn run(command: Commands, config: &TallyConfig) -> Result<i32, TallyError> {
    if let Commands::Doctor { plain } = command {
        let failures = doctor::run_doctor(config, plain).await;
        return Ok(if failures > 0 { 1 } else { 0 });
    }

    let services = Services::open(config).await?;
    let result = dispatch(command, &services).await;
    services.shutdown().await;
    result
}

async fn dispatch(command: Commands, services: &Services) -> Result<i32, TallyError> {
    let use_color = std::io::stdout().is_terminal();

    match command {
        Commands::Record {
            user,
            model,
            input_tokens,
            output_tokens,
            category,
        } => {
            let recorded = services
                .ledger
                .record_usage(&user, &model, input_tokens, output_tokens, category.as_deref())
                .await;
            print!("{}", output::render_recorded(&recorded, use_color));
            Ok(if recorded.persisted { 0 } else { 1 })
        }
        Commands::Quota { user, json } => {
            let decision = services.quotas.check_quota(&user).await;
            if json {
                println!("{}", to_json(&decision)?);
            } else {
                print!("{}", output::render_decision(&decision, use_color));
            }
            Ok(if decision.proceed { 0 } else { 2 })
        }
        Commands::Report {
            window,
            json,
            no_cache,
        } => {
            let lookup = services.cached_report(window, no_cache).await?;
            if json {
                println!("{}", to_json(&lookup.value)?);
            } else {
                print!("{}", output::render_report(&lookup, use_color));
            }
            Ok(0)
        }
        Commands::Doctor { .. } => Ok(0),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, TallyError> {
    serde_json::to_string_pretty(value).map_err(|e| TallyError::Serialization {
        source: Box::new(e),
    })
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tally={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
