//! Request/response correlation over fire-and-forget broadcast channels.
//!
//! A caller issues commands and waits for their results, but the channel
//! underneath only moves broadcasts: no pairing, no ordering, no delivery
//! guarantee. This crate bridges the two.
//!
//! ## Architecture
//!
//! - **Wait**: one outstanding correlation; the fields it still needs, what it
//!   has collected, a deadline, a policy and an exactly-once continuation.
//! - **PendingRegistry**: at most one wait per logical slot.
//! - **Correlator**: issues waits, matches every inbound event against every
//!   pending wait by field content, and resolves waits on completion, timeout
//!   or supersession.
//! - **TimerService**: one-shot cancellable timers (`TokioTimer`, `ManualTimer`).
//! - **Channel**: the outbound half of the broadcast adapter.
//! - **CorrelatorHost**: a tokio task that owns a correlator and serialises
//!   everything that touches it.
//!
//! The correlator itself owns no threads and takes no locks.

pub mod channel;
pub mod config;
pub mod correlator;
pub mod error;
pub mod event;
pub mod host;
pub mod registry;
pub mod timer;
pub mod wait;

pub use channel::{Channel, ChannelError, RecordingChannel};
pub use config::{ConfigError, EngineConfig, IssueOptions};
pub use correlator::{Correlator, CorrelatorStats, Disposition, IssueRequest};
pub use error::{CorrelationError, Result};
pub use event::{InboundEvent, OutboundCommand, Routes, Topic};
pub use host::{CorrelatorHost, HostHandle};
pub use registry::PendingRegistry;
pub use timer::{ManualTimer, TimerHandle, TimerKey, TimerService, TokioTimer};
pub use wait::{
    Collected, Continuation, Extractor, FieldSpec, Policy, Slot, Wait, WaitId, WaitKind,
    WaitOutcome, WaitState,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
