// src/cli/commands.rs
use crate::config::Config;
use crate::types::ComputeMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// PoW Bench CLI - proof-of-work mining benchmark
#[derive(Parser, Debug)]
#[command(name = "pow-bench-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (run a benchmark or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the benchmark application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Run a benchmark with the specified options
    Run(RunOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for running a benchmark
#[derive(Parser, Debug)]
pub struct RunOptions {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of compute units (overrides config)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Throttle percentage, 0-90 (overrides config)
    #[arg(long)]
    pub throttle: Option<u8>,

    /// Duration in seconds, 0 runs until Ctrl-C (overrides config)
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Per-unit stats interval in milliseconds (overrides config)
    #[arg(long)]
    pub stats_interval: Option<u64>,

    /// Compute mode to benchmark (overrides config)
    #[arg(short, long, value_enum)]
    pub mode: Option<ComputeMode>,

    /// Write the JSON report to this file (overrides config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunOptions {
    /// Applies the command-line overrides on top of `config`
    pub fn apply(&self, config: &mut Config) {
        let bench = &mut config.benchmark;
        if let Some(threads) = self.threads {
            bench.threads = threads;
        }
        if let Some(throttle) = self.throttle {
            bench.throttle_pct = throttle;
        }
        if let Some(duration) = self.duration {
            bench.duration_secs = duration;
        }
        if let Some(interval) = self.stats_interval {
            bench.stats_interval_ms = interval;
        }
        if let Some(mode) = self.mode {
            bench.mode = mode;
        }
        if let Some(output) = &self.output {
            config.report_path = Some(output.clone());
        }
    }
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_overrides_replace_config_values() {
        let cli = Commands::parse_from([
            "pow-bench-rs",
            "run",
            "--threads",
            "3",
            "--throttle",
            "40",
            "--duration",
            "5",
            "--stats-interval",
            "250",
            "--mode",
            "cryptonight-r",
            "--output",
            "report.json",
        ]);
        let Action::Run(opts) = cli.action else {
            panic!("expected run");
        };

        let mut config = Config::default();
        opts.apply(&mut config);
        assert_eq!(config.benchmark.threads, 3);
        assert_eq!(config.benchmark.throttle_pct, 40);
        assert_eq!(config.benchmark.duration_secs, 5);
        assert_eq!(config.benchmark.stats_interval_ms, 250);
        assert_eq!(config.benchmark.mode, ComputeMode::CryptoNightR);
        assert_eq!(config.report_path, Some(PathBuf::from("report.json")));
    }

    #[test]
    fn omitted_flags_keep_config_values() {
        let cli = Commands::parse_from(["pow-bench-rs", "run"]);
        let Action::Run(opts) = cli.action else {
            panic!("expected run");
        };

        let mut config = Config::default();
        opts.apply(&mut config);
        assert_eq!(config, Config::default());
        assert!(!opts.verbose);
    }

    #[test]
    fn config_command_has_default_output() {
        let cli = Commands::parse_from(["pow-bench-rs", "config"]);
        let Action::Config(opts) = cli.action else {
            panic!("expected config");
        };
        assert_eq!(opts.output, PathBuf::from("config.toml"));
    }
}
