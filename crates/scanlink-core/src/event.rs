//! Messages crossing the channel boundary.
//!
//! Outbound commands and inbound events share the same shape: an action
//! (the broadcast discriminator), an optional caller-assigned command tag, and
//! an opaque bag of fields. Inbound events are classified by [`Routes`] before
//! any field-level matching happens.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A fire-and-forget command handed to the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundCommand {
    /// Broadcast action the command is sent on.
    pub action: String,
    /// Caller-assigned tag; the receiving side may or may not echo it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_tag: Option<String>,
    /// Command payload.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl OutboundCommand {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            command_tag: None,
            fields: Map::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.command_tag = Some(tag.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A broadcast received from the channel.
///
/// Events are ephemeral: the correlator reads them and never keeps a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Discriminator used for coarse routing.
    pub action: String,
    /// Tag echoed by the sender, when it bothered to echo one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_tag: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl InboundEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            command_tag: None,
            fields: Map::new(),
        }
    }

    /// Build an event from a raw field bag, lifting the tag out of `tag_field`
    /// when it is present as a string.
    pub fn from_fields(action: impl Into<String>, fields: Map<String, Value>, tag_field: &str) -> Self {
        let command_tag = fields
            .get(tag_field)
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            action: action.into(),
            command_tag,
            fields,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.command_tag = Some(tag.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn command_tag(&self) -> Option<&str> {
        self.command_tag.as_deref()
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Get a string field; anything that is not a string reads as absent.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }
}

/// Topic an inbound discriminator belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Results of previously issued commands; matched against pending waits.
    CommandResult,
    /// Unsolicited data (scans); passed through untouched.
    Data,
}

/// Discriminator → topic table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Routes {
    routes: HashMap<String, Topic>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `action` to `topic`, replacing any previous route for it.
    pub fn add(&mut self, action: impl Into<String>, topic: Topic) -> &mut Self {
        self.routes.insert(action.into(), topic);
        self
    }

    pub fn remove(&mut self, action: &str) -> Option<Topic> {
        self.routes.remove(action)
    }

    pub fn topic_of(&self, action: &str) -> Option<Topic> {
        self.routes.get(action).copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_fields_lifts_tag() {
        let mut fields = Map::new();
        fields.insert("COMMAND_IDENTIFIER".into(), json!("GET_STATUS_1"));
        fields.insert("RESULT".into(), json!("SUCCESS"));

        let event = InboundEvent::from_fields("result", fields, "COMMAND_IDENTIFIER");
        assert_eq!(event.command_tag(), Some("GET_STATUS_1"));
        assert_eq!(event.str_field("RESULT"), Some("SUCCESS"));
    }

    #[test]
    fn test_from_fields_ignores_non_string_tag() {
        let mut fields = Map::new();
        fields.insert("COMMAND_IDENTIFIER".into(), json!(42));

        let event = InboundEvent::from_fields("result", fields, "COMMAND_IDENTIFIER");
        assert_eq!(event.command_tag(), None);
    }

    #[test]
    fn test_routes() {
        let mut routes = Routes::new();
        routes
            .add("results", Topic::CommandResult)
            .add("scans", Topic::Data);

        assert_eq!(routes.topic_of("results"), Some(Topic::CommandResult));
        assert_eq!(routes.topic_of("scans"), Some(Topic::Data));
        assert_eq!(routes.topic_of("other"), None);

        routes.add("scans", Topic::CommandResult);
        assert_eq!(routes.topic_of("scans"), Some(Topic::CommandResult));
        assert_eq!(routes.remove("scans"), Some(Topic::CommandResult));
        assert_eq!(routes.len(), 1);
    }
}
