//! Cycle kernel daemon entry point.
//!
//! Drives the block production kernel against simulated work and reports
//! the resulting timing metrics.

mod diagnostics;
mod signals;
mod simulation;

use anyhow::{Context, Result};
use clap::Parser;
use kernel_common::config::KernelConfig;
use kernel_runtime::kernel::Kernel;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::diagnostics::format_prometheus_metrics;
use crate::signals::SignalHandler;
use crate::simulation::SimulatedWork;

/// Kernel daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "kernel-daemon",
    about = "Block production cycle kernel - adaptive cycle timing and processing budgets",
    version,
    long_about = None
)]
struct Args {
    /// Path to a kernel configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target block frequency in cycles per second (overrides config file).
    #[arg(long, short = 'f')]
    frequency: Option<f64>,

    /// Maximum cycles to run (0 = infinite).
    #[arg(long, default_value = "0")]
    max_cycles: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// Print metrics in Prometheus text format on exit.
    #[arg(long)]
    prometheus: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting kernel daemon");

    let mut config = load_config(&args)?;
    if let Some(frequency) = args.frequency {
        config.block_frequency = frequency;
    }
    config.validate().context("Invalid kernel configuration")?;

    info!(
        block_frequency = config.block_frequency,
        windows = ?config.sma_windows,
        "Configuration loaded"
    );

    let work = SimulatedWork::new(&config.simulation);
    let mut kernel = Kernel::new(work, &config).context("Failed to initialize kernel")?;

    let signal_handler = SignalHandler::new(kernel.stop_handle());
    signal_handler
        .install()
        .context("Failed to set up signal handlers")?;

    let cycles = kernel.run(args.max_cycles).context("Kernel loop failed")?;

    println!("{}", kernel.metrics().report());
    if args.prometheus {
        println!("{}", format_prometheus_metrics(kernel.metrics()));
    }

    info!(
        cycles,
        overruns = kernel.metrics().overrun_count(),
        signals = signal_handler.signal_count(),
        uptime_secs = kernel.clock().uptime().as_secs(),
        "Kernel daemon shutdown complete"
    );
    Ok(())
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("kernel_daemon={level},kernel_runtime={level},kernel_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `CYCLE_KERNEL_CONFIG` environment variable
/// 3. `config/default.toml` (local development)
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<KernelConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return KernelConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    if let Ok(env_path) = std::env::var("CYCLE_KERNEL_CONFIG") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from CYCLE_KERNEL_CONFIG");
            return KernelConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from CYCLE_KERNEL_CONFIG={env_path}")
            });
        }
        warn!(
            path = %env_path,
            "CYCLE_KERNEL_CONFIG set but file does not exist, checking other locations"
        );
    }

    let local_path = PathBuf::from("config/default.toml");
    if local_path.exists() {
        info!(?local_path, "Loading config from local path");
        return KernelConfig::from_file(&local_path)
            .with_context(|| format!("Failed to load config from {}", local_path.display()));
    }

    info!("No config file found, using built-in defaults");
    Ok(KernelConfig::default())
}
