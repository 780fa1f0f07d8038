//! Tracing setup: a terse console layer on stderr plus an optional JSON
//! debug file.

use mnemos_config::LoggingConfig;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// HTTP client internals are capped at `warn` on every layer.
const QUIET_DEPS: &str = "reqwest=warn,hyper=warn,hyper_util=warn,rustls=warn";

/// `level` plus the dependency caps; an unknown level means `info`.
fn filter(level: &str) -> EnvFilter {
    let level = level.trim().to_ascii_lowercase();
    let level = if level.parse::<LevelFilter>().is_ok() {
        level
    } else {
        "info".to_string()
    };
    EnvFilter::new(format!("{level},{QUIET_DEPS}"))
}

/// Install the global subscriber.
///
/// The console shows `console_level` (or `debug` with `--verbose`). The file
/// layer honors `RUST_LOG` first, then `level`.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let console_level = if verbose { "debug" } else { config.console_level.as_str() };
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(filter(console_level));

    let file = match &config.file {
        Some(path) => {
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("cannot open log file {path}: {e}"))?;
            let file_filter = std::env::var(EnvFilter::DEFAULT_ENV)
                .ok()
                .and_then(|spec| EnvFilter::try_new(format!("{spec},{QUIET_DEPS}")).ok())
                .unwrap_or_else(|| filter(&config.level));
            Some(
                fmt::layer()
                    .json()
                    .with_writer(Mutex::new(handle))
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()?;
    Ok(())
}
