//! Scan and result streams.
//!
//! Both wrap a broadcast receiver from the correlator host and convert raw
//! inbound events into typed records on the way out.

use chrono::{DateTime, Utc};
use scanlink_core::InboundEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::{extras, scan};

/// One decoded barcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    pub data: String,
    pub label_type: Option<String>,
    pub source: Option<String>,
}

impl ScanEvent {
    /// Decode a scan broadcast. Broadcasts without a data string are not scans.
    pub fn from_event(event: &InboundEvent) -> Option<Self> {
        let data = event.str_field(scan::DATA_STRING)?;
        Some(Self {
            data: data.to_string(),
            label_type: event.str_field(scan::LABEL_TYPE).map(str::to_string),
            source: event.str_field(scan::SOURCE).map(str::to_string),
        })
    }
}

/// A DataWedge command result, as observed on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataWedgeResultEvent {
    pub action: String,
    pub command_identifier: Option<String>,
    pub extras: Map<String, Value>,
    pub received_at: DateTime<Utc>,
}

impl DataWedgeResultEvent {
    pub fn from_event(event: &InboundEvent) -> Self {
        Self {
            action: event.action.clone(),
            command_identifier: event
                .command_tag()
                .or_else(|| event.str_field(extras::COMMAND_IDENTIFIER))
                .map(str::to_string),
            extras: event.fields.clone(),
            received_at: Utc::now(),
        }
    }
}

/// Receiver of [`ScanEvent`]s.
///
/// Lagging behind the stream drops the oldest scans rather than failing.
pub struct ScanSubscription {
    rx: broadcast::Receiver<InboundEvent>,
}

impl ScanSubscription {
    pub(crate) fn new(rx: broadcast::Receiver<InboundEvent>) -> Self {
        Self { rx }
    }

    /// Next scan. Returns `None` once the host is gone.
    pub async fn recv(&mut self) -> Option<ScanEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => match ScanEvent::from_event(&event) {
                    Some(scan) => return Some(scan),
                    None => debug!(action = %event.action, "Dropping scan without data"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Scan subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered scan, without waiting.
    pub fn try_recv(&mut self) -> Option<ScanEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if let Some(scan) = ScanEvent::from_event(&event) {
                        return Some(scan);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Receiver of [`DataWedgeResultEvent`]s.
pub struct ResultSubscription {
    rx: broadcast::Receiver<InboundEvent>,
}

impl ResultSubscription {
    pub(crate) fn new(rx: broadcast::Receiver<InboundEvent>) -> Self {
        Self { rx }
    }

    /// Next result. Returns `None` once the host is gone.
    pub async fn recv(&mut self) -> Option<DataWedgeResultEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(DataWedgeResultEvent::from_event(&event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Result subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<DataWedgeResultEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(DataWedgeResultEvent::from_event(&event)),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
