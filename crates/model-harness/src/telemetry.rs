//! Tracing subscriber setup for the CLI and for test binaries.
//!
//! Only the first successful initialisation in a process takes effect; later
//! calls return `false` and leave the existing subscriber in place.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single line per event
    #[default]
    Text,
    /// Newline-delimited JSON, one object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber; `RUST_LOG` overrides `level`.
///
/// Returns whether this call installed the subscriber.
pub fn init_tracing(format: LogFormat, level: Level) -> bool {
    let registry = tracing_subscriber::registry().with(filter(level));
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .is_ok(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .is_ok(),
    }
}

/// Subscriber for test binaries: output goes through the test harness
/// capture so it only shows for failing tests.
pub fn init_test_tracing() -> bool {
    tracing_subscriber::registry()
        .with(filter(Level::DEBUG))
        .with(fmt::layer().with_test_writer())
        .try_init()
        .is_ok()
}
