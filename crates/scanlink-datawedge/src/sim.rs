//! In-process DataWedge stand-in.
//!
//! `SimulatedDataWedge` is a [`Channel`] that answers query commands by
//! broadcasting result events back into a correlator host, the same way the
//! real service answers intents. Knobs make it lose, duplicate, delay or
//! refuse traffic so the correlation paths can be exercised without a device.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scanlink_core::{Channel, ChannelError, HostHandle, InboundEvent, OutboundCommand};
use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use crate::api::{extras, results, scan, ENUMERATED_SCANNER_ACTION, RESULT_ACTION};
use crate::profile::ProfileConfig;

#[derive(Debug)]
struct SimState {
    host: Option<HostHandle>,
    present: bool,
    fail_sends: bool,
    duplicate: bool,
    echo_identifiers: bool,
    reply_delay: Duration,
    dropped: HashSet<String>,
    datawedge_status: Value,
    scanner_status: String,
    scanners: Vec<Value>,
    version: Value,
    config_result: String,
    scan_action: Option<String>,
    received: Vec<OutboundCommand>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            host: None,
            present: true,
            fail_sends: false,
            duplicate: false,
            echo_identifiers: true,
            reply_delay: Duration::ZERO,
            dropped: HashSet::new(),
            datawedge_status: json!("ENABLED"),
            scanner_status: "WAITING".to_string(),
            scanners: vec![json!({
                "SCANNER_NAME": "2D Barcode Imager",
                "SCANNER_CONNECTION_STATE": true,
                "SCANNER_INDEX": 0,
                "SCANNER_IDENTIFIER": "INTERNAL_IMAGER",
            })],
            version: json!({
                "DATAWEDGE": "11.3.28",
                "BARCODE_SCANNING": "33.0.5",
            }),
            config_result: "SUCCESS".to_string(),
            scan_action: None,
            received: Vec::new(),
        }
    }
}

/// Simulated DataWedge. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDataWedge {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDataWedge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the host replies are delivered to.
    pub fn connect(&self, host: HostHandle) {
        self.state.lock().host = Some(host);
    }

    /// An absent service accepts commands and never answers.
    pub fn set_present(&self, present: bool) -> &Self {
        self.state.lock().present = present;
        self
    }

    /// Make every send fail synchronously.
    pub fn set_fail_sends(&self, fail: bool) -> &Self {
        self.state.lock().fail_sends = fail;
        self
    }

    /// Deliver every reply twice.
    pub fn set_duplicate(&self, duplicate: bool) -> &Self {
        self.state.lock().duplicate = duplicate;
        self
    }

    /// Whether replies echo the command identifier.
    pub fn set_echo_identifiers(&self, echo: bool) -> &Self {
        self.state.lock().echo_identifiers = echo;
        self
    }

    pub fn set_reply_delay(&self, delay: Duration) -> &Self {
        self.state.lock().reply_delay = delay;
        self
    }

    /// Silently lose every reply carrying `result_key`.
    pub fn drop_result(&self, result_key: impl Into<String>) -> &Self {
        self.state.lock().dropped.insert(result_key.into());
        self
    }

    /// Stop losing replies carrying `result_key`.
    pub fn restore_result(&self, result_key: &str) -> &Self {
        self.state.lock().dropped.remove(result_key);
        self
    }

    /// Raw value answered to status queries. Any JSON, so malformed and
    /// legacy nested shapes can be produced.
    pub fn set_datawedge_status(&self, status: impl Into<Value>) -> &Self {
        self.state.lock().datawedge_status = status.into();
        self
    }

    pub fn set_scanner_status(&self, status: impl Into<String>) -> &Self {
        self.state.lock().scanner_status = status.into();
        self
    }

    pub fn set_scanners(&self, scanners: Vec<Value>) -> &Self {
        self.state.lock().scanners = scanners;
        self
    }

    /// `RESULT` answered to `SET_CONFIG`.
    pub fn set_config_result(&self, result: impl Into<String>) -> &Self {
        self.state.lock().config_result = result.into();
        self
    }

    /// Scan action from the last profile pushed.
    pub fn scan_action(&self) -> Option<String> {
        self.state.lock().scan_action.clone()
    }

    /// Every command received, in order.
    pub fn received(&self) -> Vec<OutboundCommand> {
        self.state.lock().received.clone()
    }

    /// Broadcast a scan on the configured scan action. Returns `false` when
    /// no profile has been pushed or no host is attached.
    pub async fn trigger_scan(&self, data: &str, label_type: &str) -> bool {
        let Some(action) = self.scan_action() else {
            return false;
        };
        let event = InboundEvent::new(action)
            .with_field(scan::DATA_STRING, data)
            .with_field(scan::LABEL_TYPE, label_type)
            .with_field(scan::SOURCE, "scanner");
        self.broadcast(event).await
    }

    /// Deliver an arbitrary event to the attached host.
    pub async fn broadcast(&self, event: InboundEvent) -> bool {
        let host = self.state.lock().host.clone();
        match host {
            Some(host) => host.deliver(event).await.is_ok(),
            None => false,
        }
    }

    /// Apply a command to the simulated device and build its replies.
    fn answer(state: &mut SimState, command: &OutboundCommand) -> Vec<InboundEvent> {
        let wants_result = command.field(extras::SEND_RESULT).is_some();
        let mut replies = Vec::new();

        for (extra, value) in &command.fields {
            match extra.as_str() {
                extras::GET_DATAWEDGE_STATUS => replies.push((
                    RESULT_ACTION,
                    results::GET_DATAWEDGE_STATUS,
                    state.datawedge_status.clone(),
                )),
                extras::ENUMERATE_SCANNERS => replies.push((
                    ENUMERATED_SCANNER_ACTION,
                    results::ENUMERATE_SCANNERS,
                    Value::Array(state.scanners.clone()),
                )),
                extras::GET_SCANNER_STATUS => replies.push((
                    RESULT_ACTION,
                    results::SCANNER_STATUS,
                    Value::String(state.scanner_status.clone()),
                )),
                extras::GET_VERSION_INFO => replies.push((
                    RESULT_ACTION,
                    results::GET_VERSION_INFO,
                    state.version.clone(),
                )),
                extras::SET_CONFIG => {
                    if let Some(action) = ProfileConfig::intent_action_of(value) {
                        state.scan_action = Some(action.to_string());
                    }
                    if wants_result {
                        replies.push((
                            RESULT_ACTION,
                            results::RESULT,
                            Value::String(state.config_result.clone()),
                        ));
                    }
                }
                extras::ENABLE_DATAWEDGE => {
                    let enabled = value.as_bool().unwrap_or(false);
                    let status = if enabled { "ENABLED" } else { "DISABLED" };
                    state.datawedge_status = Value::from(status);
                }
                extras::SCANNER_INPUT_PLUGIN => {
                    state.scanner_status = match value.as_str() {
                        Some("DISABLE_PLUGIN") => "DISABLED",
                        _ => "WAITING",
                    }
                    .to_string();
                }
                extras::SOFT_SCAN_TRIGGER => {
                    state.scanner_status = match value.as_str() {
                        Some("START_SCANNING") => "SCANNING",
                        _ => "WAITING",
                    }
                    .to_string();
                }
                _ => {}
            }
        }

        replies
            .into_iter()
            .filter(|(_, key, _)| !state.dropped.contains(*key))
            .map(|(action, key, value)| {
                let mut fields = Map::new();
                fields.insert(key.to_string(), value);
                if key == results::RESULT {
                    fields.insert(results::COMMAND.to_string(), json!(extras::SET_CONFIG));
                }
                if state.echo_identifiers {
                    if let Some(id) = command.field(extras::COMMAND_IDENTIFIER) {
                        fields.insert(extras::COMMAND_IDENTIFIER.to_string(), id.clone());
                    }
                }
                InboundEvent::from_fields(action, fields, extras::COMMAND_IDENTIFIER)
            })
            .collect()
    }
}

impl Channel for SimulatedDataWedge {
    fn send(&self, command: &OutboundCommand) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(ChannelError::Unavailable(
                "DataWedge service not installed".into(),
            ));
        }
        state.received.push(command.clone());
        if !state.present {
            trace!(action = %command.action, "No DataWedge present, command lost");
            return Ok(());
        }

        let mut replies = Self::answer(&mut state, command);
        if state.duplicate {
            replies.extend(replies.clone());
        }
        let Some(host) = state.host.clone() else {
            return Ok(());
        };
        let delay = state.reply_delay;
        drop(state);

        if replies.is_empty() {
            return Ok(());
        }
        debug!(count = replies.len(), delay_ms = delay.as_millis() as u64, "Simulated replies");

        // Replies go through the host queue, never straight into the caller.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    for reply in replies {
                        if host.deliver(reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
            Err(_) => {
                for reply in replies {
                    host.try_deliver(reply);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command;

    #[test]
    fn test_answers_queries_with_echoed_identifier() {
        let mut state = SimState::default();
        let replies =
            SimulatedDataWedge::answer(&mut state, &command::get_datawedge_status("R1"));

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].action, RESULT_ACTION);
        assert_eq!(replies[0].command_tag(), Some("GET_DW_STATUS_R1"));
        assert_eq!(
            replies[0].str_field(results::GET_DATAWEDGE_STATUS),
            Some("ENABLED")
        );
    }

    #[test]
    fn test_enumeration_uses_its_own_action() {
        let mut state = SimState::default();
        let replies = SimulatedDataWedge::answer(&mut state, &command::enumerate_scanners("R1"));
        assert_eq!(replies[0].action, ENUMERATED_SCANNER_ACTION);
        assert!(replies[0].field(results::ENUMERATE_SCANNERS).unwrap().is_array());
    }

    #[test]
    fn test_dropped_and_untagged_replies() {
        let mut state = SimState {
            echo_identifiers: false,
            ..Default::default()
        };
        state.dropped.insert(results::SCANNER_STATUS.to_string());

        assert!(SimulatedDataWedge::answer(&mut state, &command::get_scanner_status("R1")).is_empty());

        let replies = SimulatedDataWedge::answer(&mut state, &command::get_version_info("R1"));
        assert_eq!(replies[0].command_tag(), None);
    }

    #[test]
    fn test_control_commands_change_state() {
        let mut state = SimState::default();
        assert!(SimulatedDataWedge::answer(&mut state, &command::disable_datawedge()).is_empty());
        assert_eq!(state.datawedge_status, json!("DISABLED"));

        SimulatedDataWedge::answer(&mut state, &command::start_scanning());
        assert_eq!(state.scanner_status, "SCANNING");
        SimulatedDataWedge::answer(&mut state, &command::disable_scanner());
        assert_eq!(state.scanner_status, "DISABLED");
    }

    #[test]
    fn test_set_config_records_scan_action() {
        let mut state = SimState::default();
        let profile = ProfileConfig::new("P", "com.example.app", "com.example.app.SCAN");
        let replies = SimulatedDataWedge::answer(&mut state, &profile.to_command());

        assert_eq!(state.scan_action.as_deref(), Some("com.example.app.SCAN"));
        assert_eq!(replies[0].str_field(results::RESULT), Some("SUCCESS"));
        assert_eq!(replies[0].command_tag(), Some("SET_CONFIG_P"));
    }

    #[test]
    fn test_fail_sends() {
        let sim = SimulatedDataWedge::new();
        sim.set_fail_sends(true);
        assert!(matches!(
            sim.send(&command::enable_datawedge()),
            Err(ChannelError::Unavailable(_))
        ));
        assert!(sim.received().is_empty());
    }
}
