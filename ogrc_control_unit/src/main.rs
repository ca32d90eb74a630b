//! # OGRC
//!
//! Closed-loop antenna rotator controller. Loads one TOML configuration,
//! initialises the selected HAL driver, starts the rotator core, homes both
//! axes and serves GS-232 over TCP until interrupted.

use clap::Parser;
use ogrc_common::config::LogLevel;
use ogrc_common::consts::DEFAULT_CONFIG_PATH;
use ogrc_control_unit::config::{ControlUnitConfig, load_config};
use ogrc_control_unit::rt::RtOptions;
use ogrc_control_unit::server::Server;
use ogrc_control_unit::Rotator;
use ogrc_hal::DriverRegistry;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Upper bound for start-up homing of both axes.
const STARTUP_HOMING_TIMEOUT: Duration = Duration::from_secs(180);

/// OGRC - GS-232 antenna rotator controller
#[derive(Parser, Debug)]
#[command(name = "ogrc")]
#[command(version)]
#[command(about = "Closed-loop two-axis antenna rotator controller")]
struct Args {
    /// Path to the TOML configuration file. Missing file means defaults.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override `[server] port`.
    #[arg(long)]
    port: Option<u16>,

    /// HAL driver name.
    #[arg(long, default_value = ogrc_hal::drivers::simulation::DRIVER_NAME)]
    driver: String,

    /// Run against the simulated mount regardless of `--driver`.
    #[arg(long)]
    simulate: bool,

    /// Skip start-up homing.
    #[arg(long)]
    no_home: bool,

    /// CPU core to pin the pulse threads to.
    #[arg(long)]
    cpu_core: Option<usize>,

    /// SCHED_FIFO priority of the pulse threads (with the `rt` feature).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let loaded = load_config(&args.config);
    let level = match &loaded {
        Ok(config) => config.shared.log_level,
        Err(_) => LogLevel::Info,
    };
    setup_tracing(&args, level);

    info!("OGRC v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = loaded
        .map_err(Into::into)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("OGRC shutdown complete");
}

fn run(args: &Args, mut config: ControlUnitConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    info!(
        service = %config.shared.service_name,
        port = config.server.port,
        steps_per_degree = config.calibration.steps_per_degree(),
        "configuration loaded"
    );

    let registry = DriverRegistry::with_builtin();
    let driver_name = if args.simulate {
        ogrc_hal::drivers::simulation::DRIVER_NAME
    } else {
        args.driver.as_str()
    };
    let driver = registry.create_driver(driver_name).inspect_err(|_| {
        error!("available drivers: {:?}", registry.list_drivers());
    })?;

    let rt = RtOptions {
        cpu_core: args.cpu_core,
        priority: args.rt_priority,
    };
    let mut rotator = Rotator::start(config.calibration.clone(), driver, Some(rt))?;

    if args.no_home {
        warn!("start-up homing skipped, axes are unhomed");
    } else {
        rotator.home_all_blocking(STARTUP_HOMING_TIMEOUT)?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let signal = Arc::clone(&shutdown_tx);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        let _ = signal.send(true);
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("ogrc-net")
        .enable_all()
        .build()?;
    let axes = rotator.axes();
    let served = runtime.block_on(async {
        let server = Server::bind(&config.server, axes).await?;
        server.run(shutdown_rx).await
    });
    runtime.shutdown_timeout(Duration::from_secs(1));

    rotator.shutdown();
    served?;
    Ok(())
}

fn setup_tracing(args: &Args, configured: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        configured.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
