//! Outbound DataWedge commands.
//!
//! Control commands (enable, soft trigger, ...) are plain fire-and-forget
//! broadcasts. Queries ask DataWedge to send a result and carry a command
//! identifier of the form `<PREFIX>_<request id>`.

use scanlink_core::OutboundCommand;
use uuid::Uuid;

use crate::api::{extras, API_ACTION};

/// Identifier prefixes for queries.
pub mod prefix {
    pub const GET_DW_STATUS: &str = "GET_DW_STATUS";
    pub const ENUM_SCANNERS: &str = "ENUM_SCANNERS";
    pub const GET_SCANNER_STATUS: &str = "GET_SCANNER_STATUS";
    pub const GET_VERSION_INFO: &str = "GET_VERSION_INFO";
    pub const SET_CONFIG: &str = "SET_CONFIG";
}

/// A fresh request id, `<kind>_<uuid>`.
pub fn request_id(kind: &str) -> String {
    format!("{}_{}", kind, Uuid::new_v4())
}

/// `<prefix>_<request id>`.
pub fn command_identifier(prefix: &str, request_id: &str) -> String {
    format!("{}_{}", prefix, request_id)
}

fn api_command(extra: &str, value: impl Into<serde_json::Value>) -> OutboundCommand {
    OutboundCommand::new(API_ACTION).with_field(extra, value)
}

/// A query that asks for a result, tagged with `identifier`.
pub fn query(extra: &str, identifier: impl Into<String>) -> OutboundCommand {
    let identifier = identifier.into();
    api_command(extra, "")
        .with_field(extras::SEND_RESULT, "true")
        .with_field(extras::COMMAND_IDENTIFIER, identifier.clone())
        .with_tag(identifier)
}

pub fn get_datawedge_status(request_id: &str) -> OutboundCommand {
    query(
        extras::GET_DATAWEDGE_STATUS,
        command_identifier(prefix::GET_DW_STATUS, request_id),
    )
}

pub fn enumerate_scanners(request_id: &str) -> OutboundCommand {
    query(
        extras::ENUMERATE_SCANNERS,
        command_identifier(prefix::ENUM_SCANNERS, request_id),
    )
}

pub fn get_scanner_status(request_id: &str) -> OutboundCommand {
    query(
        extras::GET_SCANNER_STATUS,
        command_identifier(prefix::GET_SCANNER_STATUS, request_id),
    )
}

pub fn get_version_info(request_id: &str) -> OutboundCommand {
    query(
        extras::GET_VERSION_INFO,
        command_identifier(prefix::GET_VERSION_INFO, request_id),
    )
}

pub fn enable_datawedge() -> OutboundCommand {
    api_command(extras::ENABLE_DATAWEDGE, true)
}

pub fn disable_datawedge() -> OutboundCommand {
    api_command(extras::ENABLE_DATAWEDGE, false)
}

pub fn enable_scanner() -> OutboundCommand {
    api_command(extras::SCANNER_INPUT_PLUGIN, "ENABLE_PLUGIN")
}

pub fn disable_scanner() -> OutboundCommand {
    api_command(extras::SCANNER_INPUT_PLUGIN, "DISABLE_PLUGIN")
}

pub fn start_scanning() -> OutboundCommand {
    api_command(extras::SOFT_SCAN_TRIGGER, "START_SCANNING")
}

pub fn stop_scanning() -> OutboundCommand {
    api_command(extras::SOFT_SCAN_TRIGGER, "STOP_SCANNING")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_shape() {
        let cmd = get_scanner_status("AVAIL_1");

        assert_eq!(cmd.action, API_ACTION);
        assert_eq!(cmd.field(extras::GET_SCANNER_STATUS), Some(&json!("")));
        assert_eq!(cmd.field(extras::SEND_RESULT), Some(&json!("true")));
        assert_eq!(
            cmd.field(extras::COMMAND_IDENTIFIER),
            Some(&json!("GET_SCANNER_STATUS_AVAIL_1"))
        );
        assert_eq!(cmd.command_tag.as_deref(), Some("GET_SCANNER_STATUS_AVAIL_1"));
    }

    #[test]
    fn test_control_commands() {
        assert_eq!(
            enable_datawedge().field(extras::ENABLE_DATAWEDGE),
            Some(&json!(true))
        );
        assert_eq!(
            disable_scanner().field(extras::SCANNER_INPUT_PLUGIN),
            Some(&json!("DISABLE_PLUGIN"))
        );
        assert_eq!(
            stop_scanning().field(extras::SOFT_SCAN_TRIGGER),
            Some(&json!("STOP_SCANNING"))
        );
        // No result requested
        assert!(start_scanning().field(extras::SEND_RESULT).is_none());
        assert!(start_scanning().command_tag.is_none());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = request_id("AVAIL");
        let b = request_id("AVAIL");
        assert!(a.starts_with("AVAIL_"));
        assert_ne!(a, b);
    }
}
