//! Error types for flushing and configuration

/// Error returned when a flush cannot be delivered
#[derive(Debug)]
pub enum FlushError {
    /// No endpoint has been configured yet
    NoEndpoint,
    /// Payload could not be serialized
    Serialize(serde_json::Error),
    /// The HTTP client could not be built from the current settings
    Build(reqwest::Error),
    /// Connection, DNS or protocol failure
    Network(reqwest::Error),
    /// The request exceeded the configured timeout
    Timeout,
    /// The endpoint answered with a non-2xx status
    Status(u16),
    /// The aggregator task is no longer running
    Closed,
}

impl std::fmt::Display for FlushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushError::NoEndpoint => write!(f, "no stat endpoint configured"),
            FlushError::Serialize(e) => write!(f, "failed to serialize payload: {}", e),
            FlushError::Build(e) => write!(f, "failed to build http client: {}", e),
            FlushError::Network(e) => write!(f, "request failed: {}", e),
            FlushError::Timeout => write!(f, "request timed out"),
            FlushError::Status(code) => write!(f, "endpoint returned status {}", code),
            FlushError::Closed => write!(f, "aggregator is not running"),
        }
    }
}

impl std::error::Error for FlushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlushError::Serialize(e) => Some(e),
            FlushError::Build(e) | FlushError::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FlushError {
    fn from(e: serde_json::Error) -> Self {
        FlushError::Serialize(e)
    }
}

impl From<reqwest::Error> for FlushError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FlushError::Timeout
        } else {
            FlushError::Network(e)
        }
    }
}

/// Error returned when configuration cannot be loaded or is invalid
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    Io(std::io::Error),
    /// Config text is not valid TOML for `StatConfig`
    Parse(toml::de::Error),
    /// A field holds a value the client cannot run with
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config: {}", e),
            ConfigError::Invalid(reason) => write!(f, "invalid config: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(FlushError::NoEndpoint.to_string(), "no stat endpoint configured");
        assert_eq!(FlushError::Status(503).to_string(), "endpoint returned status 503");
        assert_eq!(
            ConfigError::Invalid("queue_capacity must be > 0").to_string(),
            "invalid config: queue_capacity must be > 0"
        );
    }

    #[test]
    fn test_serialize_error_converts() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let flush: FlushError = err.into();
        assert!(matches!(flush, FlushError::Serialize(_)));
        assert!(std::error::Error::source(&flush).is_some());
    }
}
