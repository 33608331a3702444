// src/main.rs
use clap::Parser;
use pow_bench_rs::stats::HardwareMonitor;
use pow_bench_rs::{BenchmarkReport, Config, Coordinator, MinerError, cli, config, utils};
use tokio::runtime::Runtime;

/// Main entry point for the benchmark
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
///
/// # Flow
/// 1. Parses command line arguments
/// 2. Delegates to appropriate subcommand handler
/// 3. Propagates any errors upward
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Run(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Runs a benchmark with the given options
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads configuration and applies CLI overrides
/// 3. Initializes the compute pool
/// 4. Runs until the deadline or Ctrl-C
/// 5. Tears the pool down and writes the report
fn run_benchmark(opts: cli::RunOptions) -> Result<(), MinerError> {
    if opts.verbose {
        utils::init_verbose_logging();
    } else {
        utils::init_logging();
    }

    let mut config = match &opts.config {
        Some(path) => config::load(path)?,
        None => Config::default(),
    };
    opts.apply(&mut config);

    let report_path = config.report_path.clone();
    let mut coordinator = Coordinator::new(config)?;

    let mut monitor = HardwareMonitor::new();
    coordinator.set_on_stats(move |stats| {
        let cpu = monitor.cpu_usage();
        let memory = monitor.memory_used_mb();
        log::info!(
            "Hashrate: {:.2} H/s (peak {:.2}) | Hashes: {} | Solutions: {} | Units: {}/{} running | CPU: {:.1}% | Mem: {} MB",
            stats.current_hashrate,
            stats.peak_hashrate,
            stats.total_hashes,
            stats.total_solutions,
            stats.running_workers,
            stats.total_workers,
            cpu,
            memory
        );
    });
    coordinator.set_on_complete(|report| {
        log::info!(
            "Benchmark complete: {:.2} H/s average over {:.1} s",
            report.stats.avg_hashrate,
            report.stats.elapsed_secs
        );
    });

    let rt = Runtime::new()?;
    let report = rt.block_on(drive(&mut coordinator))?;

    if let Some(path) = report_path {
        report.write_json(&path)?;
        log::info!("Report written to {}", path.display());
    }
    log::logger().flush();

    Ok(())
}

/// Initializes, runs and tears down the pool
///
/// The pool is always terminated, also when starting or running fails.
async fn drive(coordinator: &mut Coordinator) -> Result<BenchmarkReport, MinerError> {
    coordinator.initialize().await?;

    if let Err(err) = coordinator.start() {
        coordinator.terminate().await?;
        return Err(err);
    }

    let report = coordinator
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::warn!("Ctrl-C handler unavailable: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await;

    coordinator.terminate().await?;
    report
}

/// Generates configuration template file
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    std::fs::write(&opts.output, config::generate_template())?;
    println!("Configuration template written to {}", opts.output.display());
    Ok(())
}
