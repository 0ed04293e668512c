//! Command-line interface
//!
//! Subcommands and their options, parsed with clap's derive API.

/// Subcommand and option definitions
pub mod commands;

pub use commands::{Action, BenchmarkOptions, Commands, ConfigOptions, ListOptions, StartOptions};
