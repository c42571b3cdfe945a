//! Logging setup
//!
//! Installs a tracing-subscriber fmt subscriber filtered by `RUST_LOG`
//! (default `info`). Libraries embedding the client usually install their
//! own subscriber instead; this is for binaries and tests.

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// `STAT_LOG_JSON=1` or `true` selects JSON output
    pub fn from_env() -> Self {
        match std::env::var("STAT_LOG_JSON") {
            Ok(v) if v == "1" || v == "true" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Initialize the global subscriber. Fails if one is already installed.
pub fn init_tracing(format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_env() {
        std::env::set_var("STAT_LOG_JSON", "true");
        assert_eq!(LogFormat::from_env(), LogFormat::Json);
        std::env::set_var("STAT_LOG_JSON", "no");
        assert_eq!(LogFormat::from_env(), LogFormat::Text);
        std::env::remove_var("STAT_LOG_JSON");
    }

    #[test]
    fn test_second_init_fails() {
        // The subscriber is process-wide; keep it silent for the other tests
        std::env::set_var("RUST_LOG", "off");
        let first = init_tracing(LogFormat::Text);
        std::env::remove_var("RUST_LOG");

        assert!(first.is_ok());
        assert!(init_tracing(LogFormat::Json).is_err());
    }
}
