// src/utils/logging.rs
//! Logging configuration
//!
//! Uses `env_logger` with a compact `[ts level module:line] msg` format.
//! `RUST_LOG` always wins over the built-in defaults.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes logging for regular mining runs
///
/// Default level is Info. Kernel timings are only visible at trace level.
pub fn init_logging() {
    init_with_default(LevelFilter::Info);
}

/// Initializes logging for benchmark runs
///
/// Defaults to Debug so that every candidate found is printed.
pub fn init_bench_logging() {
    init_with_default(LevelFilter::Debug);
}

fn init_with_default(level: LevelFilter) {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(level);
    } else {
        builder.parse_env("RUST_LOG");
    }

    // A second init (tests, embedding) is not an error worth surfacing.
    let _ = builder.try_init();
}

fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_seconds();
            let level = record.level();
            let module = record.module_path().unwrap_or_default();
            let line = record.line().unwrap_or(0);

            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                ts,
                level,
                module,
                line,
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
