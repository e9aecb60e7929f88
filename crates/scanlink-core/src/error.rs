//! Error types for the correlation engine.

use thiserror::Error;

use crate::wait::Slot;

/// Result type for correlation operations.
pub type Result<T> = std::result::Result<T, CorrelationError>;

/// Ways a wait can fail.
///
/// A timed-out wait issued with [`Policy::Partial`](crate::Policy::Partial) is
/// not an error: it resolves successfully with
/// [`WaitOutcome::timed_out`](crate::WaitOutcome::timed_out) set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorrelationError {
    /// Deadline elapsed before every required field arrived (strict policy).
    #[error("Wait on slot '{slot}' timed out after {after_ms}ms")]
    Timeout { slot: Slot, after_ms: u64 },

    /// A newer wait was issued on the same slot.
    #[error("Wait on slot '{slot}' was superseded by a newer request")]
    Superseded { slot: Slot },

    /// The outbound command could not be handed to the channel.
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// The request itself is malformed (no fields, duplicate fields, zero timeout).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The correlator was shut down while the wait was pending.
    #[error("Correlator closed")]
    Closed,
}

impl CorrelationError {
    /// Stable error code, mirroring the variant name.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "TIMEOUT",
            Self::Superseded { .. } => "SUPERSEDED",
            Self::ChannelUnavailable(_) => "CHANNEL_UNAVAILABLE",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Closed => "CLOSED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CorrelationError::Timeout {
            slot: Slot::new("readiness"),
            after_ms: 3000,
        };
        assert_eq!(err.to_string(), "Wait on slot 'readiness' timed out after 3000ms");

        let err = CorrelationError::Superseded {
            slot: Slot::new("availability"),
        };
        assert!(err.to_string().contains("superseded"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CorrelationError::Closed.code(), "CLOSED");
        assert_eq!(
            CorrelationError::ChannelUnavailable("gone".into()).code(),
            "CHANNEL_UNAVAILABLE"
        );
    }
}
