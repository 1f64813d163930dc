use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt};

use crate::ContentError;

static TELEMETRY_GUARD: OnceLock<()> = OnceLock::new();

/// Options for installing the process-wide subscriber.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub env_filter: Option<String>,
    pub with_ansi: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            env_filter: None,
            with_ansi: true,
        }
    }
}

impl TelemetryOptions {
    /// Use the configured log level unless `RUST_LOG` overrides it.
    pub fn from_level(level: &str) -> Self {
        Self {
            env_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| Some(level.to_string())),
            ..Self::default()
        }
    }
}

/// Initialise the global tracing subscriber.
///
/// Safe to call multiple times; only the first invocation installs the subscriber.
pub fn init_telemetry(options: TelemetryOptions) -> Result<(), ContentError> {
    if TELEMETRY_GUARD.get().is_some() {
        return Ok(());
    }

    let env_filter = options
        .env_filter
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_ansi(options.with_ansi)
        .try_init()
        .map_err(|err| ContentError::InvalidConfiguration(format!("telemetry init failed: {err}")))?;

    TELEMETRY_GUARD.get_or_init(|| ());
    Ok(())
}
