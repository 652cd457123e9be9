//! Tracing subscriber setup
//!
//! Logs go to stdout and, when the log directory is writable, to
//! `velox-debug.log` inside it. `RUST_LOG` overrides the default `info` level.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "velox-debug.log";

/// Format timestamps using the system's local time via chrono
struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Default log directory (`~/.velox/logs`)
pub fn default_log_dir() -> PathBuf {
    crate::config::get_config_dir().join("logs")
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Does nothing if a global subscriber is already installed. Falls back to
/// stdout only when the log file cannot be opened.
pub fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<()> {
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("Tracing already initialised, keeping the existing subscriber");
        return Ok(());
    }

    let log_file = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Could not create log directory {}: {}", dir.display(), e);
            return None;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE_NAME))
            .ok()
    });

    let stdout_layer = tracing_subscriber::fmt::layer().with_timer(LocalTimer);

    match log_file {
        Some(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_timer(LocalTimer)
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(env_filter())
                .with(stdout_layer)
                .with(file_layer)
                .try_init()?;
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(stdout_layer)
                .try_init()?;
        }
    }

    tracing::debug!("Tracing initialised");
    Ok(())
}
