// src/cli/commands.rs
use crate::types::{Network, WorkMode};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// GPU Miner CLI - multi-device proof-of-work search in Rust
#[derive(Parser, Debug)]
#[command(name = "gpu-miner-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Start mining on work read from a getwork file
    Start(StartOptions),

    /// Mine a synthetic template for a fixed time and report hashrates
    Benchmark(BenchmarkOptions),

    /// List the compute devices found
    List(ListOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for starting the mining operation
#[derive(Parser, Debug)]
pub struct StartOptions {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Device indices to use, comma separated (overrides config)
    #[arg(short, long, value_delimiter = ',')]
    pub devices: Option<Vec<usize>>,

    /// Getwork JSON file to follow (overrides config)
    #[arg(short, long)]
    pub work_file: Option<PathBuf>,

    /// Work mode (overrides config)
    #[arg(short, long)]
    pub mode: Option<WorkMode>,

    /// Network (overrides config)
    #[arg(short, long)]
    pub network: Option<Network>,
}

/// Options for running benchmarks
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Duration of benchmark in seconds
    #[arg(short = 't', long, default_value_t = 60)]
    pub duration: u64,

    /// Number of emulated CPU devices
    #[arg(short, long, default_value_t = 1)]
    pub devices: usize,

    /// Threads per device (0 = share all cores evenly)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Nonces per scan
    #[arg(long, default_value_t = 1 << 20)]
    pub throughput: u32,
}

/// Options for listing devices
#[derive(Parser, Debug)]
pub struct ListOptions {
    /// Path to configuration file, for the backend settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,
}
