//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events; applications embedding the
//! session client call [`init_tracing`] once at startup to see them.
//!
//! ## Filter
//! `RUST_LOG` wins when set and parseable, otherwise the level passed to
//! [`init_tracing_with_level`] (`info` for [`init_tracing`]).
//!
//! ## Format
//! `REALMKEY_LOG_FORMAT=json` switches from human-readable lines to one JSON
//! object per event.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_FORMAT_VAR: &str = "REALMKEY_LOG_FORMAT";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Read the format from `REALMKEY_LOG_FORMAT`; unknown values fall back
    /// to [`LogFormat::Pretty`].
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_VAR) {
            Ok(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global subscriber at `info`.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing() -> bool {
    init_tracing_with_level("info")
}

/// Install the global subscriber with `level` as the fallback filter.
pub fn init_tracing_with_level(level: &str) -> bool {
    init_tracing_with(level, LogFormat::from_env())
}

/// Install the global subscriber with an explicit format.
pub fn init_tracing_with(level: &str, format: LogFormat) -> bool {
    let filter = build_filter(level);

    let fmt_layer = match format {
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(false).boxed(),
    };

    let installed = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init().is_ok();

    if installed {
        tracing::debug!(?format, "tracing initialised");
    }
    installed
}

fn build_filter(level: &str) -> EnvFilter {
    std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}
