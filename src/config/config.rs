// src/config/config.rs
use crate::miner::throttle::MAX_THROTTLE;
use crate::types::ComputeMode;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the benchmark
///
/// Contains the benchmark parameters plus the coordinator settings that
/// surround them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Benchmark parameters
    #[serde(default)]
    pub benchmark: BenchmarkConfig,

    /// Upper bound for all units to finish INIT, in seconds
    /// (default: 300)
    #[serde(default = "default_init_timeout")]
    pub init_timeout_secs: u64,

    /// Where to write the JSON report; no report when unset
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

/// Parameters of one benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of compute units
    /// (default: number of CPU cores)
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Share of every duty cycle spent sleeping, 0-90
    /// (default: 20)
    #[serde(default = "default_throttle", alias = "throttle")]
    pub throttle_pct: u8,

    /// Run length in seconds; 0 runs until interrupted
    /// (default: 60)
    #[serde(default = "default_duration", alias = "duration")]
    pub duration_secs: u64,

    /// Period of per-unit STATS events, in milliseconds
    /// (default: 1000)
    #[serde(default = "default_stats_interval", alias = "stats_interval")]
    pub stats_interval_ms: u64,

    /// Compute primitive to benchmark
    /// (default: randomx-light)
    #[serde(default = "default_mode")]
    pub mode: ComputeMode,
}

fn default_init_timeout() -> u64 {
    300
}

fn default_threads() -> usize {
    num_cpus::get()
}

fn default_throttle() -> u8 {
    20
}

fn default_duration() -> u64 {
    60
}

fn default_stats_interval() -> u64 {
    1000
}

fn default_mode() -> ComputeMode {
    ComputeMode::RandomXLight
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            threads: default_threads(),
            throttle_pct: default_throttle(),
            duration_secs: default_duration(),
            stats_interval_ms: default_stats_interval(),
            mode: default_mode(),
        }
    }
}

impl BenchmarkConfig {
    /// Checks the parameter ranges
    ///
    /// # Errors
    /// `ConfigError` naming the first offending field.
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.threads == 0 {
            return Err(MinerError::ConfigError(
                "threads must be at least 1".into(),
            ));
        }
        if self.throttle_pct > MAX_THROTTLE {
            return Err(MinerError::ConfigError(format!(
                "throttle_pct must be between 0 and {}, got {}",
                MAX_THROTTLE, self.throttle_pct
            )));
        }
        if self.stats_interval_ms == 0 {
            return Err(MinerError::ConfigError(
                "stats_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Run length, or `None` when the run is open-ended
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            benchmark: BenchmarkConfig::default(),
            init_timeout_secs: default_init_timeout(),
            report_path: None,
        }
    }
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(MinerError)` - If file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::parse(&config_str)?;
        config.benchmark.validate()?;
        Ok(config)
    }

    /// Parses a TOML document; missing fields take their defaults
    pub fn parse(config_str: &str) -> Result<Self, MinerError> {
        toml::from_str(config_str)
            .map_err(|e| MinerError::ConfigError(format!("Invalid config format: {}", e)))
    }

    /// INIT settlement bound
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# PoW Benchmark Configuration\n\n");
        template.push_str("# Seconds to wait for every unit to finish initializing\n");
        template.push_str("init_timeout_secs = 300\n");
        template.push_str("# Write the JSON report here when the run ends\n");
        template.push_str("# report_path = \"benchmark-report.json\"\n\n");
        template.push_str("[benchmark]\n");
        template.push_str("# Number of compute units (defaults to the CPU count)\n");
        template.push_str(&format!("threads = {}\n", default_threads()));
        template.push_str("# Percentage of each duty cycle spent sleeping (0-90)\n");
        template.push_str("throttle_pct = 20\n");
        template.push_str("# Run length in seconds (0 = until Ctrl-C)\n");
        template.push_str("duration_secs = 60\n");
        template.push_str("# Per-unit stats period in milliseconds\n");
        template.push_str("stats_interval_ms = 1000\n");
        template.push_str(
            "# Supported modes: randomx-light, randomx-fast, cryptonight-v7, cryptonight-r\n",
        );
        template.push_str("mode = \"randomx-light\"\n");
        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.benchmark.throttle_pct, 20);
        assert_eq!(config.benchmark.duration_secs, 60);
        assert_eq!(config.benchmark.stats_interval_ms, 1000);
        assert_eq!(config.benchmark.mode, ComputeMode::RandomXLight);
        assert_eq!(config.init_timeout(), Duration::from_secs(300));
        assert!(config.benchmark.threads >= 1);
    }

    #[test]
    fn template_parses_and_validates() {
        let config = Config::parse(&Config::generate_template()).unwrap();
        config.benchmark.validate().unwrap();
        assert_eq!(config.report_path, None);
    }

    #[test]
    fn short_field_names_are_accepted() {
        let config = Config::parse(
            r#"
            report_path = "out.json"
            [benchmark]
            threads = 4
            throttle = 30
            duration = 0
            stats_interval = 250
            mode = "cryptonight-r"
            "#,
        )
        .unwrap();
        assert_eq!(config.benchmark.threads, 4);
        assert_eq!(config.benchmark.throttle_pct, 30);
        assert_eq!(config.benchmark.duration(), None);
        assert_eq!(config.benchmark.stats_interval_ms, 250);
        assert_eq!(config.benchmark.mode, ComputeMode::CryptoNightR);
        assert_eq!(config.report_path, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let base = BenchmarkConfig::default();

        let no_threads = BenchmarkConfig {
            threads: 0,
            ..base.clone()
        };
        assert!(matches!(no_threads.validate(), Err(MinerError::ConfigError(_))));

        let too_throttled = BenchmarkConfig {
            throttle_pct: 91,
            ..base.clone()
        };
        assert!(matches!(too_throttled.validate(), Err(MinerError::ConfigError(_))));

        let edge = BenchmarkConfig {
            throttle_pct: 90,
            ..base.clone()
        };
        assert!(edge.validate().is_ok());

        let no_interval = BenchmarkConfig {
            stats_interval_ms: 0,
            ..base
        };
        assert!(matches!(no_interval.validate(), Err(MinerError::ConfigError(_))));
    }

    #[test]
    fn unknown_mode_is_a_config_error() {
        let err = Config::parse("[benchmark]\nmode = \"sha256\"\n").unwrap_err();
        assert!(matches!(err, MinerError::ConfigError(_)));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Config::load("/nonexistent/pow-bench.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pow-bench.toml"));
    }
}
