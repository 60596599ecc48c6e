//! Tracing initialisation for dpacheck binaries.
//!
//! Call [`init_tracing`] once at program start. `RUST_LOG` takes precedence
//! over the level chosen on the command line.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default level for a given verbosity flag.
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Initialise the global tracing subscriber.
///
/// * `json` emits newline-delimited JSON records instead of the
///   human-readable format.
/// * `level` is used when `RUST_LOG` is unset or invalid.
///
/// Logs go to stderr so that command output on stdout stays parseable.
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
