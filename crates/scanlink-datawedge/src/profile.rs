//! `SET_CONFIG` profile bundle.
//!
//! The profile binds the application package to DataWedge, turns on barcode
//! input, routes scans to the app as broadcast intents and switches keystroke
//! output off. Every plugin is sent with `RESET_CONFIG` so stale defaults left
//! on the device do not survive.

use scanlink_core::OutboundCommand;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::{extras, API_ACTION};
use crate::command::prefix;

/// Intent delivery mode: broadcast. DataWedge expects an integer here.
pub const INTENT_DELIVERY_BROADCAST: i64 = 2;

/// Profile settings sent with `SET_CONFIG`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub profile_name: String,
    pub package_name: String,
    /// Action scans are broadcast on.
    pub intent_action: String,
    /// Activities the profile is bound to.
    #[serde(default = "default_activities")]
    pub activities: Vec<String>,
}

fn default_activities() -> Vec<String> {
    vec!["*".to_string()]
}

impl ProfileConfig {
    pub fn new(
        profile_name: impl Into<String>,
        package_name: impl Into<String>,
        intent_action: impl Into<String>,
    ) -> Self {
        Self {
            profile_name: profile_name.into(),
            package_name: package_name.into(),
            intent_action: intent_action.into(),
            activities: default_activities(),
        }
    }

    /// Command identifier used for this profile's `SET_CONFIG`.
    pub fn command_identifier(&self) -> String {
        format!("{}_{}", prefix::SET_CONFIG, self.profile_name)
    }

    /// The profile bundle.
    pub fn to_bundle(&self) -> Value {
        json!({
            "PROFILE_NAME": self.profile_name,
            "PROFILE_ENABLED": "true",
            "CONFIG_MODE": "CREATE_IF_NOT_EXIST",
            "RESET_CONFIG": "true",
            "APP_LIST": [{
                "PACKAGE_NAME": self.package_name,
                "ACTIVITY_LIST": self.activities,
            }],
            "PLUGIN_CONFIG": [
                plugin("BARCODE", json!({
                    "scanner_input_enabled": "true",
                    "scanner_selection": "auto",
                    "configure_all_scanners": "true",
                    "lcd_mode": "3",
                })),
                plugin("INTENT", json!({
                    "intent_output_enabled": "true",
                    "intent_action": self.intent_action,
                    "intent_delivery": INTENT_DELIVERY_BROADCAST,
                })),
                plugin("KEYSTROKE", json!({
                    "keystroke_output_enabled": "false",
                })),
            ],
        })
    }

    /// `SET_CONFIG` command asking for a result.
    pub fn to_command(&self) -> OutboundCommand {
        let identifier = self.command_identifier();
        OutboundCommand::new(API_ACTION)
            .with_field(extras::SET_CONFIG, self.to_bundle())
            .with_field(extras::SEND_RESULT, "true")
            .with_field(extras::COMMAND_IDENTIFIER, identifier.clone())
            .with_tag(identifier)
    }

    /// Pull the scan action back out of a `SET_CONFIG` bundle.
    pub fn intent_action_of(bundle: &Value) -> Option<&str> {
        bundle
            .get("PLUGIN_CONFIG")?
            .as_array()?
            .iter()
            .find(|p| p.get("PLUGIN_NAME").and_then(Value::as_str) == Some("INTENT"))?
            .get("PARAM_LIST")?
            .get("intent_action")?
            .as_str()
    }
}

fn plugin(name: &str, params: Value) -> Value {
    json!({
        "PLUGIN_NAME": name,
        "RESET_CONFIG": "true",
        "PARAM_LIST": params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ProfileConfig {
        ProfileConfig::new("CAP_DW_PROFILE", "com.example.app", "com.example.app.SCAN")
    }

    #[test]
    fn test_bundle_contents() {
        let bundle = profile().to_bundle();

        assert_eq!(bundle["PROFILE_NAME"], "CAP_DW_PROFILE");
        assert_eq!(bundle["CONFIG_MODE"], "CREATE_IF_NOT_EXIST");
        assert_eq!(bundle["APP_LIST"][0]["PACKAGE_NAME"], "com.example.app");
        assert_eq!(bundle["APP_LIST"][0]["ACTIVITY_LIST"], json!(["*"]));

        let plugins = bundle["PLUGIN_CONFIG"].as_array().unwrap();
        let names: Vec<&str> = plugins
            .iter()
            .map(|p| p["PLUGIN_NAME"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["BARCODE", "INTENT", "KEYSTROKE"]);
        assert_eq!(plugins[1]["PARAM_LIST"]["intent_delivery"], json!(2));
        assert_eq!(plugins[2]["PARAM_LIST"]["keystroke_output_enabled"], "false");
    }

    #[test]
    fn test_command_and_round_trip_of_action() {
        let cmd = profile().to_command();
        assert_eq!(cmd.command_tag.as_deref(), Some("SET_CONFIG_CAP_DW_PROFILE"));

        let bundle = cmd.field(extras::SET_CONFIG).unwrap();
        assert_eq!(
            ProfileConfig::intent_action_of(bundle),
            Some("com.example.app.SCAN")
        );
        assert_eq!(ProfileConfig::intent_action_of(&json!({})), None);
    }
}
