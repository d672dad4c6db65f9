//! Tracing setup for the binaries.
//!
//! `RUST_LOG` selects what is logged (default `info`), `RUST_LOG_FORMAT`
//! selects how: `json` for one JSON object per event, anything else for the
//! compact human format.

use std::env::var;
use std::str::FromStr;

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const FORMAT_VAR: &str = "RUST_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        })
    }
}

impl LogFormat {
    /// Format named by `RUST_LOG_FORMAT`, compact when unset
    pub fn from_env() -> Self {
        var(FORMAT_VAR).ok().and_then(|value| value.parse().ok()).unwrap_or_default()
    }
}

#[derive(Debug, Error)]
#[error("a global tracing subscriber is already installed")]
pub struct AlreadyInitialized;

/// Install the global subscriber at `info`
pub fn init() -> Result<(), AlreadyInitialized> {
    init_with_level(LevelFilter::INFO)
}

/// Install the global subscriber with `level` as the default directive
pub fn init_with_level(level: LevelFilter) -> Result<(), AlreadyInitialized> {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_layer = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(log_layer).try_init().map_err(|_| AlreadyInitialized)
}
