use std::env;
use std::fs;
use std::path::Path;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps the non-blocking file writers flushing until dropped at exit.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

fn console_filter(verbose: bool) -> EnvFilter {
    match env::var("HDCS_LOG") {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::new(spec.trim()),
        _ if verbose => EnvFilter::new("debug"),
        _ => EnvFilter::new("info"),
    }
}

/// stderr at `HDCS_LOG` (default info, `-v` for debug), plus daily
/// `debug.log` and `error.log` files under the logs directory.
pub fn init(logs_dir: &Path, verbose: bool) -> LogGuards {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(console_filter(verbose));

    let mut guards = Vec::new();
    let file_layers = if fs::create_dir_all(logs_dir).is_ok() {
        let (debug_writer, debug_guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, "debug.log"));
        let (error_writer, error_guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, "error.log"));
        guards.push(debug_guard);
        guards.push(error_guard);
        Some(
            fmt::layer()
                .with_writer(debug_writer)
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG)
                .and_then(
                    fmt::layer()
                        .with_writer(error_writer)
                        .with_ansi(false)
                        .with_filter(LevelFilter::WARN),
                ),
        )
    } else {
        None
    };
    let file_enabled = file_layers.is_some();

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layers)
        .try_init();

    debug!(logs_dir = %logs_dir.display(), file_enabled, "logging configured");
    LogGuards { _guards: guards }
}
