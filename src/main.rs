//! Carousel Sorter - Main Entry Point
//!
//! Runs the partition-synchronised sorting controller:
//! 1. Load and validate the rig configuration
//! 2. Construct the rig (simulated when no hardware drivers are linked)
//! 3. Calibrate detectors, spawn the polling tasks and supervise them
//! 4. On Ctrl+C or after `--duration-secs`, drain every task and stop the motor

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use carousel_sorter::config::{self, SorterConfig};
use carousel_sorter::hardware::simulated;
use carousel_sorter::pipeline;

#[derive(Parser, Debug)]
#[command(name = "carousel-sorter")]
#[command(about = "Partition-synchronised metal sorting controller")]
#[command(version)]
struct CliArgs {
    /// Path to a sorter_config.toml. Overrides $CAROUSEL_CONFIG and ./sorter_config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long, env = "CAROUSEL_DURATION_SECS")]
    duration_secs: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Print the final run summary as JSON on stdout
    #[arg(long)]
    summary_json: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SorterConfig> {
    match path {
        Some(p) => SorterConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => Ok(SorterConfig::load()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let sorter_config = load_config(args.config.as_ref())?;
    if args.print_config {
        print!("{}", sorter_config.to_toml()?);
        return Ok(());
    }
    config::init(sorter_config);
    let cfg = config::get();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  CAROUSEL SORTER - rig {}", cfg.rig.name);
    info!(
        "  Export offset: {} | Cycle: {}+{}+{} ms | Tracker band: {:.3} ± {:.3} m",
        cfg.export.offset,
        cfg.actuator.open_ms,
        cfg.actuator.hold_ms,
        cfg.actuator.close_ms,
        cfg.tracker.partition_distance_m,
        cfg.tracker.tolerance_m
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let rig = simulated::build_rig(cfg).context("Rig construction failed")?;

    // Graceful shutdown via Ctrl+C or a fixed run time
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });
    if let Some(secs) = args.duration_secs {
        let timer_token = cancel_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!("🛑 Run time of {}s elapsed, initiating shutdown...", secs);
            timer_token.cancel();
        });
    }

    let summary = pipeline::run(cfg, rig, cancel_token).await?;

    if args.summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
