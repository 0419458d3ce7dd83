//! Tracing configuration and log routing.
//!
//! Stdout carries the MCP protocol, so console logs go to stderr using a compact formatter.
//! When a log directory is configured, logs are also appended to
//! `<log_dir>/chroma_mcp_server.log` through a non‑blocking writer.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_NAME: &str = "chroma_mcp_server.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Configure tracing subscribers for stderr and optional file logging.
///
/// - Respects `RUST_LOG`, then `LOG_LEVEL`, defaulting to `info`.
/// - Uses a global guard to keep the non‑blocking writer alive for the process lifetime.
/// - Later calls are no-ops.
pub fn init_tracing(log_dir: Option<&Path>) {
    if INITIALIZED.set(()).is_err() {
        return;
    }

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer);

    let result = if let Some(writer) = log_dir.and_then(configure_file_writer) {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).try_init()
    } else {
        registry.try_init()
    };

    if let Err(err) = result {
        eprintln!("Tracing subscriber already installed: {err}");
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL")
            .ok()
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());
        EnvFilter::try_new(level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Build a non‑blocking writer for file logging.
///
/// Returns `None` when the directory cannot be created.
fn configure_file_writer(dir: &Path) -> Option<NonBlocking> {
    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("Failed to create log directory {}: {err}", dir.display());
        return None;
    }
    let file_appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn log_level_applies_when_rust_log_is_unset() {
        unsafe {
            std::env::remove_var("RUST_LOG");
            std::env::set_var("LOG_LEVEL", "DEBUG");
        }
        assert_eq!(env_filter().max_level_hint(), Some(LevelFilter::DEBUG));

        unsafe { std::env::remove_var("LOG_LEVEL") };
        assert_eq!(env_filter().max_level_hint(), Some(LevelFilter::INFO));
    }
}
