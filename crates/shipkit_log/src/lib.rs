//! Logging bootstrap for shipkit crates.
//!
//! Library crates only emit `tracing` events; hosts (the Python bridge, test
//! harnesses, embedding binaries) call [`init_logging`] once to install a
//! stderr subscriber. `SHIPKIT_LOG` overrides the configured level with any
//! `EnvFilter` directive string.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding an `EnvFilter` directive.
pub const C_ENV_LOG_FILTER: &str = "SHIPKIT_LOG";

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumLogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl EnumLogLevel {
    /// Parse a log level from a string.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_filter_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumLogFormat {
    /// Human-readable compact text.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl EnumLogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Configuration for [`init_logging`].
#[derive(Debug, Clone, Default)]
pub struct SpecLogConfig {
    /// Level applied to `shipkit*` targets when `SHIPKIT_LOG` is unset.
    pub level: EnumLogLevel,
    /// Output format.
    pub format: EnumLogFormat,
}

/// Build the filter: `SHIPKIT_LOG` wins, otherwise shipkit crates at `level`.
pub fn derive_env_filter(level: EnumLogLevel) -> EnvFilter {
    match std::env::var(C_ENV_LOG_FILTER) {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::new(directive),
        _ => EnvFilter::new(derive_default_directive(level)),
    }
}

fn derive_default_directive(level: EnumLogLevel) -> String {
    let c_level = level.as_filter_str();
    ["shipkit_io_fs", "shipkit_manifest", "shipkit_manifest_py"]
        .iter()
        .map(|target| format!("{target}={c_level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install a global stderr subscriber.
///
/// Returns `false` if a global subscriber was already installed (the call is
/// then a no-op).
pub fn init_logging(config: SpecLogConfig) -> bool {
    let filter = derive_env_filter(config.level);
    let registry = tracing_subscriber::registry().with(filter);

    let res_init = match config.format {
        EnumLogFormat::Json => registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init(),
        EnumLogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .compact(),
            )
            .try_init(),
    };
    res_init.is_ok()
}
