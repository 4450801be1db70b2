//! Log output for applications and tests embedding the client.
//!
//! Every event the crate emits has a target under [`LOG_TARGET`]. The filter
//! built here applies the configured level to those targets only, so an
//! embedding application keeps control of its own logs. `RUST_LOG`
//! overrides it when set.

use tracing::Level;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Target prefix of all events emitted by this crate.
pub const LOG_TARGET: &str = "delegated_crypto";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines on stdout
    #[default]
    Text,
    /// One JSON object per event
    Json,
    /// Human-readable lines captured by the test harness
    Test,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Some(Self::Text),
            "json" => Some(Self::Json),
            "test" => Some(Self::Test),
            _ => None,
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level applied to this crate's events when `RUST_LOG` is unset
    pub level: Level,
    /// Output format
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
        }
    }
}

impl TracingConfig {
    /// Create config from `DELEGATION_LOG_LEVEL` and `DELEGATION_LOG_FORMAT`.
    ///
    /// Unparseable values keep the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DELEGATION_LOG_LEVEL") {
            config.level = val.trim().parse().unwrap_or(config.level);
        }

        if let Ok(val) = std::env::var("DELEGATION_LOG_FORMAT") {
            config.format = LogFormat::parse(&val).unwrap_or(config.format);
        }

        config
    }

    /// Set level.
    #[must_use]
    pub const fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Filter directive scoping `level` to this crate.
    #[must_use]
    pub fn directive(&self) -> String {
        format!(
            "{LOG_TARGET}={}",
            self.level.as_str().to_ascii_lowercase()
        )
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }
}

/// Install the global tracing subscriber.
///
/// Returns `false` when a global subscriber was already installed; the
/// existing one is left in place.
pub fn init_tracing(config: &TracingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(config.filter());
    let layer = tracing_subscriber::fmt::layer().with_target(true);

    let installed = match config.format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
        LogFormat::Test => registry.with(layer.with_test_writer()).try_init(),
    };
    installed.is_ok()
}
