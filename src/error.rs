/// Error types for fetching, gating and configuration
use thiserror::Error;

/// Everything a telemetry query can report back to its caller.
///
/// Only `Server` mutates shared state: it opens the cooldown window in the
/// rate limiter. The other kinds are reported and otherwise inert.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    /// Connectivity problem or request timeout
    #[error("Could not reach the telemetry service: {0}")]
    Network(String),

    /// 5xx response
    #[error("Telemetry service failed with status {status}")]
    Server { status: u16 },

    /// 4xx response, including rejected filters
    #[error("Telemetry request was rejected with status {status}")]
    Client { status: u16 },

    /// 2xx response whose body is not a readings envelope
    #[error("Unexpected response from the telemetry service: {0}")]
    Parse(String),

    /// Local rejection while backing off after a server error
    #[error("Telemetry service is recovering, try again in {remaining_seconds}s")]
    Cooldown { remaining_seconds: u64 },
}

impl TelemetryError {
    pub fn is_server_error(&self) -> bool {
        matches!(self, TelemetryError::Server { .. })
    }

    /// Classify a non-success HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            400..=499 => TelemetryError::Client { status },
            500..=599 => TelemetryError::Server { status },
            other => TelemetryError::Network(format!("unexpected status {}", other)),
        }
    }
}

impl From<reqwest::Error> for TelemetryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TelemetryError::Network("request timed out".to_string())
        } else if e.is_decode() {
            TelemetryError::Parse(e.to_string())
        } else {
            TelemetryError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}
