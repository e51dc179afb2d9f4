// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shepherd - sermon follow-up messaging for churches.
//!
//! This is the binary entry point for the Shepherd service.

mod app;
mod commands;
mod serve;

use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use shepherd_core::types::QueueStatus;

use crate::app::App;

/// Shepherd - sermon follow-up messaging for churches.
#[derive(Parser, Debug)]
#[command(name = "shepherd", version, about, long_about = None)]
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
    /// Run the scheduler until interrupted.
    Serve,
    /// Run one queue sweep now.
    Process {
        /// Skip the delivery report refresh.
        #[arg(long)]
        no_refresh: bool,
    },
    /// Generate and queue the weekly messages for a processed sermon (JSON).
    Generate {
        sermon: PathBuf,
        /// Print what would be queued without storing anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Send a single high-priority message immediately.
    SendTest {
        #[arg(long)]
        phone: String,
        /// Template code, e.g. SERMON_SUMMARY_001.
        #[arg(long)]
        template: String,
        /// Template variable as key=value. Repeatable.
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },
    /// List queue items.
    Queue {
        #[arg(long, value_parser = parse_status)]
        status: Option<QueueStatus>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Cancel a pending queue item.
    Cancel { id: String },
    /// Pending scheduled messages for a UTC date (YYYY-MM-DD).
    Scheduled {
        date: NaiveDate,
        #[arg(long)]
        json: bool,
    },
    /// Sending statistics.
    Stats {
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long)]
        json: bool,
    },
    /// Manage the member directory.
    Members {
        #[command(subcommand)]
        action: MembersAction,
    },
    /// Archive finished queue items and prune records past retention.
    Purge {
        /// Override `retention.archive_after_days`.
        #[arg(long)]
        days: Option<u32>,
    },
    /// Show the provider account balance.
    Balance,
}

#[derive(Subcommand, Debug)]
enum MembersAction {
    /// Import members from a JSON array.
    Import { file: PathBuf },
    /// List members and their opt-ins.
    List {
        #[arg(long)]
        json: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{s}`"))
}

fn parse_status(s: &str) -> Result<QueueStatus, String> {
    QueueStatus::from_str(&s.to_ascii_uppercase()).map_err(|_| {
        format!("unknown status `{s}` (PENDING, PROCESSING, SENT, DELIVERED, READ, FAILED, CANCELLED)")
    })
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("shepherd={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => shepherd_config::load_and_validate_path(path),
        None => shepherd_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            shepherd_config::render_errors(&errors);
            std::process::exit(2);
        }
    };
    init_tracing(&config.app.log_level);

    let app = match App::open(config).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("shepherd: {e}");
            std::process::exit(1);
        }
    };

    let result = run_command(&app, cli.command).await;
    if let Err(e) = app.close().await {
        tracing::warn!(error = %e, "failed to close storage cleanly");
    }

    if let Err(e) = result {
        eprintln!("shepherd: {e}");
        std::process::exit(1);
    }
}

async fn run_command(app: &App, command: Commands) -> Result<(), shepherd_core::ShepherdError> {
    match command {
        Commands::Serve => serve::run_serve(app).await,
        Commands::Process { no_refresh } => commands::run_process(app, !no_refresh).await,
        Commands::Generate { sermon, dry_run } => {
            commands::run_generate(app, &sermon, dry_run).await
        }
        Commands::SendTest {
            phone,
            template,
            vars,
        } => commands::run_send_test(app, &phone, &template, vars).await,
        Commands::Queue {
            status,
            limit,
            json,
        } => commands::run_queue(app, status, limit, json).await,
        Commands::Cancel { id } => commands::run_cancel(app, &id).await,
        Commands::Scheduled { date, json } => commands::run_scheduled(app, date, json).await,
        Commands::Stats { days, json } => commands::run_stats(app, days, json).await,
        Commands::Members { action } => match action {
            MembersAction::Import { file } => commands::run_members_import(app, &file).await,
            MembersAction::List { json } => commands::run_members_list(app, json).await,
        },
        Commands::Purge { days } => commands::run_purge(app, days).await,
        Commands::Balance => commands::run_balance(app).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_send_test_variables() {
        let cli = Cli::try_parse_from([
            "shepherd",
            "send-test",
            "--phone",
            "010-1111-2222",
            "--template",
            "MEDITATION_002",
            "--var",
            "sermon_title=믿음=행함",
        ])
        .unwrap();
        let Commands::SendTest { vars, .. } = cli.command else {
            panic!("expected send-test");
        };
        assert_eq!(vars, vec![("sermon_title".to_string(), "믿음=행함".to_string())]);
    }

    #[test]
    fn status_filter_is_case_insensitive() {
        assert_eq!(parse_status("failed").unwrap(), QueueStatus::Failed);
        assert!(parse_status("lost").is_err());
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn default_config_is_valid() {
        let config = shepherd_config::load_and_validate_str("").unwrap();
        assert_eq!(config.app.log_level, "info");
    }
}
