//! SONiC overlayd entry point.
//!
//! Loads the configuration, provisions every configured overlay segment and
//! keeps them in place until interrupted.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use sonic_overlayd::audit::{init_logging, init_logging_pretty};
use sonic_overlayd::config::DEFAULT_CONFIG_PATH;
use sonic_overlayd::{OverlayDaemon, OverlaydConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

/// SONiC Overlay Segment Daemon
#[derive(Parser, Debug)]
#[command(name = "overlayd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Provision, print the switch inventory and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match args.log_format {
        LogFormat::Json => init_logging(&args.log_level),
        LogFormat::Pretty => init_logging_pretty(&args.log_level),
    }

    info!("====================================================================");
    info!("Starting SONiC overlayd");
    info!("====================================================================");
    info!("Config: {}", args.config.display());
    if args.once {
        info!("One-shot mode: ENABLED");
    }

    match run(args).await {
        Ok(true) => {
            info!("SONiC overlayd shutdown complete");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            warn!("SONiC overlayd finished with failed segments");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every segment was provisioned.
async fn run(args: Args) -> anyhow::Result<bool> {
    let config = OverlaydConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    info!("VXLAN UDP port: {}", config.switch.vxlan_udp_port);
    info!("Segments: {}", config.segments.len());
    info!("Provision timeout: {:?}", config.provision_timeout());

    let mut daemon = OverlayDaemon::new(config).context("building daemon")?;

    let stop = daemon.stop_handle();
    let shutdown_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received SIGINT, shutting down gracefully...");
                stop.stop();
            }
            Err(err) => {
                error!("Failed to listen for ctrl-c: {}", err);
            }
        }
    });

    let report = daemon.run(args.once).await;
    shutdown_handle.abort();
    let report = report.context("running daemon")?;

    if args.once {
        print!("{}", report.inventory);
    }
    Ok(report.is_clean())
}
