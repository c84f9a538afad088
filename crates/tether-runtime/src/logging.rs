//! Logging setup
//!
//! The runtime and the SDK emit `tracing` events; nothing is printed until a
//! subscriber is installed, either by the host application or with
//! [`init_with_config`].

use std::io;

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Emit JSON lines instead of human-readable output
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // TETHER_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("TETHER_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        // TETHER_LOG_JSON: any value enables JSON output
        config.json_format = std::env::var("TETHER_LOG_JSON").is_ok();

        config
    }
}

fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration.
///
/// Only the first call has an effect. `RUST_LOG` overrides the configured
/// level. If the host already installed a global subscriber it is kept.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = config.level.as_str().to_lowercase();
            EnvFilter::new(format!("tether_sdk={level},tether_runtime={level}"))
        });

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = if config.json_format {
            registry
                .with(fmt::layer().json().with_writer(io::stderr))
                .try_init()
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(true)
                        .with_line_number(cfg!(debug_assertions)),
                )
                .try_init()
        };
        if result.is_err() {
            tracing::debug!("global subscriber already installed, keeping it");
        }
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}
