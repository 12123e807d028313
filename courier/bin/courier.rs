//! Send a templated email to a list of leads or applications, paced and
//! throttled
//!
//! - `courier send` runs one batch session (Ctrl-C cancels, a second Ctrl-C
//!   aborts, SIGUSR1 toggles pause)
//! - `courier check` builds the recipient queue without sending anything

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use courier::{Courier, CourierConfig, Report, SendOptions};
use courier_dispatch::{SendStatus, SourceRecord};

/// Paced batch email dispatch
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Send templated emails to leads and applications", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to COURIER_CONFIG, then
    /// ./courier.config.ron, then /etc/courier/courier.config.ron)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a batch send session
    Send {
        /// JSON array of recipient records
        #[arg(short, long)]
        recipients: PathBuf,

        /// Log every email instead of sending it
        #[arg(long)]
        dry_run: bool,

        /// After the session, reset and resend failed and rate-limited
        /// recipients once
        #[arg(long)]
        recover: bool,
    },
    /// Build the recipient queue and report what would be sent
    Check {
        /// JSON array of recipient records
        #[arg(short, long)]
        recipients: PathBuf,
    },
}

fn read_recipients(path: &Path) -> anyhow::Result<Vec<SourceRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read recipients from {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse recipients in {}", path.display()))
}

fn print_report(report: &Report) {
    let session = &report.session;
    println!(
        "Session {} {}",
        session.session_id,
        if session.cancelled { "cancelled" } else { "completed" }
    );
    println!(
        "  sent: {}  failed: {}  skipped: {}  rate limited: {}",
        session.success, session.failed, session.skipped, session.rate_limited
    );

    if !report.recovered.is_empty() {
        let resent = report
            .recovered
            .iter()
            .filter(|(_, outcome)| outcome.is_ok())
            .count();
        println!("  resent: {resent} of {}", report.recovered.len());
    }

    for record in &report.records {
        match record.status {
            SendStatus::Success | SendStatus::Pending => {}
            status => println!(
                "  {:<12} {} <{}> {}",
                status.to_string(),
                record.id,
                record.email,
                record
                    .error
                    .as_deref()
                    .or(record.skip_reason.as_deref())
                    .unwrap_or_default()
            ),
        }
    }

    println!(
        "  pending: {}  reset: {}",
        report.counts.get(SendStatus::Pending),
        report.counts.get(SendStatus::Reset)
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (path, config) = CourierConfig::locate(cli.config.as_deref())?;
    courier_common::logging::init(&config.logging);
    courier_common::internal!(level = INFO, "Loaded configuration from {}", path.display());

    let courier = Courier::new(config);

    match cli.command {
        Commands::Send {
            recipients,
            dry_run,
            recover,
        } => {
            let records = read_recipients(&recipients)?;
            let report = courier
                .send(records, SendOptions { dry_run, recover })
                .await?;
            print_report(&report);
        }
        Commands::Check { recipients } => {
            let records = read_recipients(&recipients)?;
            let total = records.len();
            let queue = courier.queue(records);

            println!("{} of {total} records are sendable", queue.len());
            println!("  without email: {}", queue.without_email());
            for rejected in queue.rejected() {
                println!("  rejected: {rejected}");
            }
        }
    }

    Ok(())
}
