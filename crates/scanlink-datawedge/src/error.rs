//! Errors surfaced by the DataWedge facade.

use scanlink_core::{ConfigError, CorrelationError};
use thiserror::Error;

/// Facade error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataWedgeError {
    /// The wait or send underneath failed.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// A caller-supplied option is unusable.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DataWedgeError {
    /// Stable machine-readable code for callers that reject with a code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Correlation(err) => err.code(),
            Self::InvalidOption(_) => "INVALID_OPTION",
            Self::Config(_) => "INVALID_CONFIG",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Correlation(CorrelationError::Timeout { .. }))
    }
}

/// Result alias for facade operations.
pub type Result<T> = std::result::Result<T, DataWedgeError>;
