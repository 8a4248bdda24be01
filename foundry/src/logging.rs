//! Tracing setup.
//!
//! - **stderr**: compact, filtered by `RUST_LOG` (default `foundry=info`).
//! - **`<log_dir>/foundry.log`**: appended, no ANSI, `foundry=debug`. This is
//!   the persistent log; console output stays a short summary.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Name of the persistent log file inside the log directory.
pub const LOG_FILE_NAME: &str = "foundry.log";

/// Install the global subscriber. `log_dir` enables the file layer.
///
/// # Example
/// ```bash
/// RUST_LOG=foundry=debug foundry drain
/// ```
pub fn init(log_dir: Option<&Path>) -> Result<()> {
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("foundry=info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(stderr_filter);

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
            let path = dir.join(LOG_FILE_NAME);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_thread_names(true)
                    .with_filter(EnvFilter::new("foundry=debug")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
