//! Tracing setup: console narration mirrored into the run's console.log.
//!
//! The log file is a second subscriber sink, not a redirected stdout, so
//! summary tables printed by the metrics code still reach the terminal
//! untouched while every narrated phase and per-task failure lands in both
//! places.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber.
///
/// Verbosity maps as: default info (the benchmark narrates its phases),
/// -v debug, -vv+ trace. AWS runtime crates stay at warn unless trace is
/// requested.
pub fn init(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let (own_level, aws_level) = match verbose {
        0 => ("info", "warn"),
        1 => ("debug", "warn"),
        2 => ("trace", "info"),
        _ => ("trace", "debug"),
    };
    let filter = EnvFilter::new(format!(
        "startup_bench={own_level},aws_config={aws_level},aws_smithy_runtime={aws_level}"
    ));

    let console_layer = fmt::layer().with_target(false);

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
    Ok(())
}
