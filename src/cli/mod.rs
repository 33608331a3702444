//! Command-line interface
//!
//! Argument definitions for the `run` and `config` subcommands.

/// Clap command definitions
pub mod commands;

pub use commands::{Action, Commands, ConfigOptions, RunOptions};
