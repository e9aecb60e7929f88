//! Outbound side of the channel adapter.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::event::OutboundCommand;

/// Synchronous send failures. Silent loss is not reported here; the channel
/// has no way to know, and the wait's deadline surfaces it instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// Nothing is there to receive the command.
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    /// The channel refused this particular command.
    #[error("Command rejected: {0}")]
    Rejected(String),
}

/// Fire-and-forget broadcast sender.
pub trait Channel: Send + Sync {
    fn send(&self, command: &OutboundCommand) -> Result<(), ChannelError>;
}

impl<C: Channel + ?Sized> Channel for Arc<C> {
    fn send(&self, command: &OutboundCommand) -> Result<(), ChannelError> {
        (**self).send(command)
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send(&self, command: &OutboundCommand) -> Result<(), ChannelError> {
        (**self).send(command)
    }
}

/// Channel that records everything sent through it. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<OutboundCommand>>>,
    failure: Arc<Mutex<Option<ChannelError>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with `error` (`None` restores success).
    pub fn fail_with(&self, error: Option<ChannelError>) {
        *self.failure.lock() = error;
    }

    pub fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.lock().clone()
    }
}

impl Channel for RecordingChannel {
    fn send(&self, command: &OutboundCommand) -> Result<(), ChannelError> {
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        self.sent.lock().push(command.clone());
        Ok(())
    }
}
