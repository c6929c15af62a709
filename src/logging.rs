//! Structured logging setup (C13).
//!
//! Every component logs through `tracing` rather than `println!`/`eprintln!`.
//! This module only owns process-wide initialization; call sites elsewhere
//! use the `tracing` macros directly.

use tracing_subscriber::EnvFilter;

/// Output format for log lines, selected by the `LOG_FORMAT` config value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_config_str(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Initialize the global tracing subscriber. Must be called once, before any
/// other component logs. `level` is a standard tracing filter directive
/// (e.g. `"info"`, `"debug"`); `format` selects JSON or human-readable text.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Json => subscriber.json().try_init(),
        LogFormat::Text => subscriber.try_init(),
    };

    if let Err(err) = result {
        eprintln!("logging already initialized: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_defaults_to_text() {
        assert_eq!(LogFormat::from_config_str("anything-else"), LogFormat::Text);
        assert_eq!(LogFormat::from_config_str("json"), LogFormat::Json);
    }
}
