//! Error types for zigsight-core.
//!
//! Telemetry noise never surfaces as an error: malformed payloads degrade to
//! neutral values and analytics degeneracy yields `None`. The variants here
//! cover configuration mistakes and the I/O performed by scanners and export.
//!
//! | Error Type | Typical cause |
//! |------------|---------------|
//! | [`Error::InvalidConfig`] | Unknown scanner mode, missing mode settings, bad weights |
//! | [`Error::Scan`] | No host scanning tool produced output |
//! | [`Error::Timeout`] | A host scanning tool did not finish in time |
//! | [`Error::Csv`] | Export serialization failed |

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the analytics core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Wi-Fi scan failed.
    #[error("Wi-Fi scan failed: {0}")]
    Scan(String),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Failed to parse shared data.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Telemetry source failure.
    #[error("Telemetry source '{source_name}' failed: {message}")]
    Source {
        /// Name of the failing source.
        source_name: String,
        /// Description of the failure.
        message: String,
    },

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// CSV serialization error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a telemetry source error.
    pub fn source_failed(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Whether the error was caused by caller configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}

impl From<zigsight_types::ParseError> for Error {
    fn from(err: zigsight_types::ParseError) -> Self {
        match err {
            zigsight_types::ParseError::InvalidValue(msg) => Error::InvalidData(msg),
            zigsight_types::ParseError::UnknownMetric(name) => {
                Error::InvalidConfig(format!("unknown metric '{}'", name))
            }
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::InvalidData(format!("Parse error: {}", err)),
        }
    }
}

/// Result type alias using zigsight-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_config("scan_data is required for manual mode");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: scan_data is required for manual mode"
        );

        let err = Error::timeout("iwlist scan", Duration::from_secs(30));
        assert!(err.to_string().contains("iwlist scan"));
        assert!(err.to_string().contains("30s"));

        let err = Error::source_failed("zigbee2mqtt", "broker unreachable");
        assert!(err.to_string().contains("zigbee2mqtt"));
        assert!(err.to_string().contains("broker unreachable"));
    }

    #[test]
    fn test_is_config_error() {
        assert!(Error::invalid_config("bad").is_config_error());
        assert!(!Error::Scan("no tool".to_string()).is_config_error());
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = zigsight_types::ParseError::UnknownMetric("uptime".to_string()).into();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("uptime"));

        let err: Error = zigsight_types::ParseError::InvalidValue("x".to_string()).into();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "iwlist not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("iwlist not found"));
    }
}
