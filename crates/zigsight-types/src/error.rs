//! Error types for zigsight-types.

use thiserror::Error;

/// Errors that can occur when parsing shared data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A value was present but could not be interpreted.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A trend metric name is not recognized.
    #[error("Unknown metric '{0}': expected one of health_score, battery, link_quality, reconnect_rate")]
    UnknownMetric(String),
}

/// Result type alias using zigsight-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
