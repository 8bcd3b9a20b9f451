//! Server Warden CLI
//!
//! Keeps a game-server process alive and its save data safe: health checks,
//! crash classification, escalating repair, tiered backups with retention.

use anyhow::Result;
use clap::{Parser, Subcommand};
use server_warden::{config, IntegrityVerifier, Supervisor, WardenConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Server Warden - game-server supervision and backups")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/server-warden/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show service status and latest health verdict
    Status {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one health check
    Check {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify the last stop as intentional or crash
    Classify,
    /// Run the escalating repair sequence now
    Repair,
    /// Run one backup (with retention and verification)
    Backup,
    /// Enforce the retention policy now
    Prune,
    /// Verify a backup artifact
    Verify {
        /// Artifact path (zip archive or backup directory)
        path: PathBuf,
    },
    /// Show backup statistics
    Stats {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Watch the service continuously, repairing and backing up as needed
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => WardenConfig::load_from(path)?,
        None => WardenConfig::load_from(&config::config_path())?,
    };

    match cli.command {
        Commands::Status { json } | Commands::Check { json } => {
            let mut supervisor = Supervisor::from_config(config)?;
            let verdict = supervisor.check_health();
            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                println!(
                    "{} - service {}, {}",
                    if verdict.is_healthy { "HEALTHY" } else { "UNHEALTHY" },
                    verdict.service_status,
                    verdict.reason
                );
            }
            if !verdict.is_healthy {
                std::process::exit(1);
            }
        }

        Commands::Classify => {
            let supervisor = Supervisor::from_config(config)?;
            let intentional = supervisor.classify_stop();
            println!(
                "Last stop classified as {}",
                if intentional { "intentional" } else { "crash" }
            );
        }

        Commands::Repair => {
            let mut supervisor = Supervisor::from_config(config)?;
            let report = tokio::task::spawn_blocking(move || supervisor.repair()).await?;
            println!("Repair finished: {:?}", report.final_state);
            if !report.succeeded() {
                std::process::exit(1);
            }
        }

        Commands::Backup => {
            let mut supervisor = Supervisor::from_config(config)?;
            let artifact = tokio::task::spawn_blocking(move || supervisor.backup()).await??;
            println!(
                "Backup written: {} ({})",
                artifact.path.display(),
                server_warden::format_size(artifact.size_bytes)
            );
        }

        Commands::Prune => {
            let supervisor = Supervisor::from_config(config)?;
            let summary = supervisor.prune()?;
            println!(
                "Removed {} backups, freed {}",
                summary.removed,
                server_warden::format_size(summary.freed_bytes)
            );
        }

        Commands::Verify { path } => {
            if IntegrityVerifier::verify(&path) {
                println!("OK: {}", path.display());
            } else {
                println!("INVALID: {}", path.display());
                std::process::exit(1);
            }
        }

        Commands::Stats { json } => {
            let supervisor = Supervisor::from_config(config)?;
            let stats = supervisor.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "{} backups, {} total, newest {}, oldest {}",
                    stats.count,
                    stats.total_size_human,
                    stats.newest.as_deref().unwrap_or("-"),
                    stats.oldest.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Watch => {
            info!("Starting warden watch loop");
            let mut supervisor = Supervisor::from_config(config)?;
            // The loop is deliberately blocking; keep it off the async workers.
            tokio::task::spawn_blocking(move || supervisor.run()).await??;
        }
    }

    Ok(())
}
