// src/main.rs
use clap::Parser;
use crossbeam_channel::unbounded;
use gpu_miner_rs::utils::clock::{Clock, SystemClock};
use gpu_miner_rs::utils::logging::init_bench_logging;
use gpu_miner_rs::{self, *};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Main entry point for the miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails, including every device
///   being lost, which makes the process exit with a non-zero status
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Start(opts) => start_mining(opts),
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::List(opts) => list_devices(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Where the devices get their work from
enum WorkFeed {
    /// Getwork file refreshed by an external fetcher
    File(FileWorkSource),
    /// One synthetic template, for benchmarks
    Synthetic,
}

/// Everything a mining session needs besides its work feed
struct Session {
    backend: Arc<dyn Backend>,
    devices: Vec<usize>,
    network: Network,
    benchmark: bool,
    stats_interval: Duration,
    telemetry_interval: Duration,
    duration: Option<Duration>,
}

/// Starts the mining operation with given configuration options
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads configuration and applies CLI overrides
/// 3. Follows the configured getwork file until interrupted
fn start_mining(opts: cli::StartOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let mut config = config::load(&opts.config)?;
    // Apply CLI overrides
    if let Some(devices) = opts.devices {
        config.devices = devices;
    }
    if let Some(file) = opts.work_file {
        config.work.file = file;
    }
    if let Some(mode) = opts.mode {
        config.work.mode = mode;
    }
    if let Some(network) = opts.network {
        config.network = network;
    }
    config.validate()?;

    let source = FileWorkSource::new(
        config.work.file.clone(),
        config.work.mode,
        config.poll_interval(),
        Arc::new(SystemClock),
    );
    let session = Session {
        backend: create_backend(&config),
        devices: config.devices.clone(),
        network: config.network,
        benchmark: false,
        stats_interval: config.stats_interval(),
        telemetry_interval: config.telemetry_interval(),
        duration: None,
    };

    run_session(session, WorkFeed::File(source))
}

/// Mines a synthetic template on the CPU backend for a fixed time
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    let mut config = Config::default();
    config.cpu.devices = opts.devices;
    config.cpu.threads = opts.threads;
    config.cpu.throughput = opts.throughput;
    config.validate()?;

    log::info!(
        "Starting benchmark on {} device(s) for {} seconds",
        opts.devices,
        opts.duration
    );

    let session = Session {
        backend: create_backend(&config),
        devices: Vec::new(),
        network: config.network,
        benchmark: true,
        stats_interval: Duration::from_secs(5),
        telemetry_interval: config.telemetry_interval(),
        duration: Some(Duration::from_secs(opts.duration)),
    };

    run_session(session, WorkFeed::Synthetic)
}

/// Prints every device the backend enumerates
fn list_devices(opts: cli::ListOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let config = match opts.config {
        Some(path) => config::load(path)?,
        None => Config::default(),
    };
    let backend = create_backend(&config);
    let devices = backend.enumerate()?;
    if devices.is_empty() {
        return Err(MinerError::NoDevices);
    }

    for device in devices {
        println!("#{}: {} ({})", device.index, device.name, backend.name());
    }
    Ok(())
}

/// Generates configuration template file
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    let config = config::generate_template();
    std::fs::write(&opts.output, config)?;
    println!("Configuration template written to {}", opts.output.display());
    Ok(())
}

fn create_backend(config: &Config) -> Arc<dyn Backend> {
    Arc::new(CpuBackend::new(
        config.cpu.devices,
        config.cpu.threads,
        config.cpu.throughput,
    ))
}

/// Runs devices, collector and reporters until the session ends
///
/// The session ends on Ctrl-C, when the benchmark duration elapses, or
/// when every device worker has stopped on its own.
fn run_session(session: Session, feed: WorkFeed) -> Result<(), MinerError> {
    let shutdown = Shutdown::new();
    let dispatcher = Arc::new(WorkDispatcher::new());
    let (candidate_sender, candidate_receiver) = unbounded();
    let (solved_sender, solved_receiver) = unbounded::<SolvedWork>();

    let registry = Registry::new(session.backend.clone(), session.devices);
    let miner = registry.launch(&dispatcher, candidate_sender, shutdown.signal())?;
    let device_stats = miner.stats();

    let mut collector = Collector::new(device_stats.clone(), Some(solved_sender))
        .for_network(session.network);
    if session.benchmark {
        collector = collector.benchmark();
    }
    let collector = collector.spawn(candidate_receiver)?;

    let submitter = std::thread::Builder::new()
        .name("solved".into())
        .spawn(move || {
            for work in solved_receiver {
                log::info!(
                    "Solved work from device ordinal {}: {}",
                    work.ordinal,
                    hex::encode(&work.data[..])
                );
            }
        })?;

    let mut background: Vec<JoinHandle<()>> = Vec::new();
    match feed {
        WorkFeed::File(source) => background.push(source.spawn(dispatcher.clone(), shutdown.signal())?),
        WorkFeed::Synthetic => {
            dispatcher.dispatch(WorkTemplate::synthetic(SystemClock.unix_now()));
        }
    }
    background.push(
        TelemetrySampler::new(session.backend.clone(), device_stats.clone(), session.telemetry_interval)
            .spawn(shutdown.signal())?,
    );
    background.push(
        StatsReporter::new(device_stats.clone(), session.stats_interval).start_reporting(shutdown.signal())?,
    );

    // Runtime setup
    let rt = Runtime::new()?;
    let report = rt.block_on(async {
        let mut workers = tokio::task::spawn_blocking(move || miner.join());
        let deadline = async {
            match session.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            report = &mut workers => return report.map_err(MinerError::from),
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => log::info!("Interrupted, stopping devices"),
                Err(e) => log::error!("Failed to listen for Ctrl-C, stopping devices: {}", e),
            },
            _ = deadline => log::info!("Benchmark time elapsed, stopping devices"),
        }

        shutdown.trigger();
        Ok::<_, MinerError>(workers.await?)
    })?;

    // Workers may all have stopped on their own; release the rest too.
    shutdown.trigger();
    for handle in background {
        if handle.join().is_err() {
            log::warn!("Background thread panicked");
        }
    }
    if collector.join().is_err() {
        log::warn!("Collector thread panicked");
    }
    if submitter.join().is_err() {
        log::warn!("Solved work thread panicked");
    }

    StatsReporter::new(device_stats, session.stats_interval).report_summary();
    log::logger().flush(); // Ensure final results appear

    for (ordinal, e) in &report.lost {
        log::debug!("Device ordinal {} ended with: {}", ordinal, e);
    }
    let finished = report.into_result()?;
    log::info!("{} device(s) stopped cleanly", finished);
    Ok(())
}
