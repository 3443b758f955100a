//! Logging configuration for accsyn-compute.
//!
//! Engine output is forwarded verbatim to stdout where the farm backend reads it,
//! so the tracing subscriber writes to stderr to keep the two streams apart.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above).
    Verbose,
    /// Very verbose output (trace level).
    Trace,
}

impl Verbosity {
    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Raise the level to at least debug output.
    ///
    /// Used when debug mode is switched on through `--dev` or `ACCSYN_DEBUG`.
    #[must_use]
    pub fn with_debug(self, debug: bool) -> Self {
        match (self, debug) {
            (Self::Normal, true) => Self::Verbose,
            (other, _) => other,
        }
    }
}

/// Whether debug mode is requested through the environment.
///
/// Both `ACCSYN_DEBUG` and the legacy `FILMHUB_DEBUG` are honoured; the
/// values `1` and `true` switch it on.
#[must_use]
pub fn debug_from_env() -> bool {
    flag_from_env("ACCSYN_DEBUG") || flag_from_env("FILMHUB_DEBUG")
}

/// Whether development mode is requested through the environment.
///
/// Same rule as [`debug_from_env`], for `ACCSYN_DEV` and `FILMHUB_DEV`.
#[must_use]
pub fn dev_from_env() -> bool {
    flag_from_env("ACCSYN_DEV") || flag_from_env("FILMHUB_DEV")
}

fn flag_from_env(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true")
}

/// Initialize the logging system.
///
/// This should be called once at application startup. The logging level can be
/// controlled via:
/// 1. The `verbosity` parameter
/// 2. The `RUST_LOG` environment variable (takes precedence)
///
/// # Examples
///
/// ```no_run
/// use accsyn_compute::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Normal);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let level = verbosity.to_level_filter();
    let default_filter = format!("accsyn_compute={level},accsyn_engine={level},engine={level}");

    // Allow RUST_LOG to override
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    // Install the subscriber (ignore error if already set)
    let _ = subscriber.try_init();
}

/// Initialize logging for tests.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
