// src/config/mod.rs
//! Configuration management for the benchmark
//!
//! This module handles all configuration-related functionality including:
//! - Loading and parsing configuration files
//! - Generating configuration templates
//! - Validating benchmark parameters
//!
//! The configuration uses TOML format; every field is optional and falls
//! back to its default.

/// Core configuration implementation
///
/// Contains the [`Config`] and [`BenchmarkConfig`] structs.
pub mod config;

// Re-export key items for easy access
pub use config::{BenchmarkConfig, Config};

use crate::utils::error::MinerError;
use std::path::PathBuf;

/// Loads benchmark configuration from a TOML file
///
/// # Arguments
/// * `path` - Path to the configuration file (anything convertible to PathBuf)
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded configuration
/// * `Err(MinerError)` - If the file couldn't be read, parsed or validated
pub fn load(path: impl Into<PathBuf>) -> Result<Config, MinerError> {
    Config::load(path)
}

/// Generates a commented configuration template
pub fn generate_template() -> String {
    Config::generate_template()
}
