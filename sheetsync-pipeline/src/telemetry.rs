//! Tracing Subscriber Initialization
//!
//! Logs are structured JSON by default, one event per line, ready for a log
//! collector. Set `SHEETSYNC_LOG_FORMAT=pretty` for human-readable output
//! and `RUST_LOG` to override the filter.

use sheetsync_core::{ConfigError, SyncResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "sheetsync=info,sheetsync_pipeline=info,sheetsync_clients=info,info";

/// Output format of log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: std::env::var("SHEETSYNC_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(LogFormat::Json),
            default_filter: DEFAULT_FILTER.to_string(),
            service_name: std::env::var("SHEETSYNC_SERVICE_NAME")
                .unwrap_or_else(|_| "sheetsync".to_string()),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Must be called once at startup, before any event is emitted.
pub fn init_tracing(config: &TelemetryConfig) -> SyncResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };

    result.map_err(|e| ConfigError::InvalidValue {
        field: "tracing_subscriber".to_string(),
        value: format!("{:?}", config.format),
        reason: format!("Failed to init subscriber: {}", e),
    })?;

    tracing::info!(
        service_name = %config.service_name,
        format = ?config.format,
        version = env!("CARGO_PKG_VERSION"),
        "Telemetry initialized"
    );

    Ok(())
}
