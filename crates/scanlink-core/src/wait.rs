//! Wait records: one outstanding correlation between issued commands and a
//! caller continuation.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{CorrelationError, Result};
use crate::event::InboundEvent;
use crate::timer::TimerHandle;

/// Field values collected so far, keyed by field name.
pub type Collected = BTreeMap<String, Value>;

/// Normalises a raw field value. `None` means the value is malformed and the
/// field counts as not present.
pub type Extractor = fn(&Value) -> Option<Value>;

/// Logical identity of "the one operation of this type that may be outstanding".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(String);

impl Slot {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Slot {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Slot {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Identity of one issued wait. Monotonic per correlator, so a timer that
/// fires for an older wait on the same slot is recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaitId(pub(crate) u64);

impl WaitId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WaitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Default extractor: any non-null value is accepted as-is.
pub fn non_null(value: &Value) -> Option<Value> {
    (!value.is_null()).then(|| value.clone())
}

/// A result field a wait needs before it is complete.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    command_tag: Option<String>,
    extractor: Extractor,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_tag: None,
            extractor: non_null,
        }
    }

    /// Only accept the field from events whose tag starts with `prefix`.
    /// Events that carry no tag at all are still matched by content.
    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_tag = Some(prefix.into());
        self
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag_prefix(&self) -> Option<&str> {
        self.command_tag.as_deref()
    }

    /// Pull this field out of `event`, if it carries a usable value for it.
    pub fn extract(&self, event: &InboundEvent) -> Option<Value> {
        if let (Some(prefix), Some(tag)) = (self.command_tag.as_deref(), event.command_tag()) {
            if !tag.starts_with(prefix) {
                return None;
            }
        }
        event.field(&self.name).and_then(self.extractor)
    }
}

impl From<&str> for FieldSpec {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Number of fields a wait needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
    SingleField,
    MultiFieldAggregate,
}

/// What happens when the deadline passes before the wait is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Fail with [`CorrelationError::Timeout`].
    #[default]
    Strict,
    /// Resolve with whatever was collected and `timed_out` set.
    Partial,
}

/// Lifecycle of a wait. Every state but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    Pending,
    Complete,
    TimedOut,
    Superseded,
    Closed,
    /// A command for the wait could not be handed to the channel.
    Failed,
}

impl WaitState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Successful resolution of a wait.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitOutcome {
    pub slot: Slot,
    /// Values collected, first observation of each field.
    pub fields: Collected,
    /// Required fields that never arrived. Empty unless `timed_out`.
    pub missing: Vec<String>,
    /// Set when the deadline resolved a partial-policy wait.
    pub timed_out: bool,
    /// Time between issue and resolution.
    pub elapsed: Duration,
}

impl WaitOutcome {
    /// `true` when every required field was confirmed before the deadline.
    pub fn is_complete(&self) -> bool {
        !self.timed_out
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }
}

type Callback = Box<dyn FnOnce(Result<WaitOutcome>) + Send>;

/// Exactly-once callback for a wait. Both `resolve` and `fail` consume it.
pub struct Continuation(Callback);

impl Continuation {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<WaitOutcome>) + Send + 'static,
    {
        Self(Box::new(callback))
    }

    /// A continuation that forwards its result into a oneshot channel.
    pub fn channel() -> (Self, oneshot::Receiver<Result<WaitOutcome>>) {
        let (tx, rx) = oneshot::channel();
        let continuation = Self::new(move |result| {
            // Receiver gone means the caller stopped caring.
            let _ = tx.send(result);
        });
        (continuation, rx)
    }

    pub fn resolve(self, outcome: WaitOutcome) {
        (self.0)(Ok(outcome))
    }

    pub fn fail(self, error: CorrelationError) {
        (self.0)(Err(error))
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Continuation")
    }
}

/// A pending wait as held by the registry.
#[derive(Debug)]
pub struct Wait {
    id: WaitId,
    slot: Slot,
    kind: WaitKind,
    required: Vec<FieldSpec>,
    collected: Collected,
    policy: Policy,
    issued_at: Instant,
    deadline: Instant,
    continuation: Continuation,
    timer: Option<TimerHandle>,
    state: WaitState,
}

impl Wait {
    pub(crate) fn new(
        id: WaitId,
        slot: Slot,
        required: Vec<FieldSpec>,
        policy: Policy,
        issued_at: Instant,
        timeout: Duration,
        continuation: Continuation,
    ) -> Self {
        let kind = if required.len() > 1 {
            WaitKind::MultiFieldAggregate
        } else {
            WaitKind::SingleField
        };
        Self {
            id,
            slot,
            kind,
            required,
            collected: Collected::new(),
            policy,
            issued_at,
            deadline: issued_at + timeout,
            continuation,
            timer: None,
            state: WaitState::Pending,
        }
    }

    pub fn id(&self) -> WaitId {
        self.id
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    pub fn kind(&self) -> WaitKind {
        self.kind
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn collected(&self) -> &Collected {
        &self.collected
    }

    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.required.iter().map(FieldSpec::name)
    }

    /// Required fields not collected yet.
    pub fn missing(&self) -> Vec<String> {
        self.required
            .iter()
            .filter(|spec| !self.collected.contains_key(spec.name()))
            .map(|spec| spec.name().to_string())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.required
            .iter()
            .all(|spec| self.collected.contains_key(spec.name()))
    }

    /// Copy every still-missing field that `event` carries. Fields already
    /// collected are never overwritten. Returns the number of new fields.
    pub(crate) fn absorb(&mut self, event: &InboundEvent) -> usize {
        let mut absorbed = 0;
        for spec in &self.required {
            if self.collected.contains_key(spec.name()) {
                continue;
            }
            if let Some(value) = spec.extract(event) {
                self.collected.insert(spec.name().to_string(), value);
                absorbed += 1;
            }
        }
        absorbed
    }

    pub(crate) fn set_timer(&mut self, handle: TimerHandle) {
        self.timer = Some(handle);
    }

    pub(crate) fn take_timer(&mut self) -> Option<TimerHandle> {
        self.timer.take()
    }

    /// Leave `Pending` for `state`. Returns `false`, changing nothing, if the
    /// wait already left `Pending` or `state` is not terminal.
    pub(crate) fn finish(&mut self, state: WaitState) -> bool {
        if self.state.is_terminal() || !state.is_terminal() {
            return false;
        }
        self.state = state;
        true
    }

    pub(crate) fn into_outcome(self, now: Instant) -> (WaitOutcome, Continuation) {
        let missing = self.missing();
        let outcome = WaitOutcome {
            slot: self.slot,
            fields: self.collected,
            missing,
            timed_out: self.state == WaitState::TimedOut,
            elapsed: now.saturating_duration_since(self.issued_at),
        };
        (outcome, self.continuation)
    }

    pub(crate) fn into_continuation(self) -> Continuation {
        self.continuation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wait(fields: &[&str]) -> Wait {
        let required = fields.iter().map(|f| FieldSpec::new(*f)).collect();
        Wait::new(
            WaitId(1),
            Slot::new("test"),
            required,
            Policy::Strict,
            Instant::now(),
            Duration::from_millis(100),
            Continuation::new(|_| {}),
        )
    }

    #[test]
    fn test_kind_follows_field_count() {
        assert_eq!(wait(&["A"]).kind(), WaitKind::SingleField);
        assert_eq!(wait(&["A", "B"]).kind(), WaitKind::MultiFieldAggregate);
    }

    #[test]
    fn test_absorb_first_writer_wins() {
        let mut w = wait(&["A", "B"]);

        assert_eq!(w.absorb(&InboundEvent::new("r").with_field("A", 1)), 1);
        assert_eq!(w.absorb(&InboundEvent::new("r").with_field("A", 2)), 0);
        assert!(!w.is_complete());
        assert_eq!(w.missing(), vec!["B".to_string()]);

        assert_eq!(w.absorb(&InboundEvent::new("r").with_field("B", 3)), 1);
        assert!(w.is_complete());
        assert_eq!(w.collected().get("A"), Some(&json!(1)));
    }

    #[test]
    fn test_null_counts_as_absent() {
        let mut w = wait(&["A"]);
        assert_eq!(w.absorb(&InboundEvent::new("r").with_field("A", Value::Null)), 0);
        assert!(!w.is_complete());
    }

    #[test]
    fn test_tag_prefix() {
        let spec = FieldSpec::new("RESULT").with_tag_prefix("SET_CONFIG_");

        let tagged = InboundEvent::new("r")
            .with_tag("SET_CONFIG_profile")
            .with_field("RESULT", "SUCCESS");
        let other = InboundEvent::new("r")
            .with_tag("ENABLE_1")
            .with_field("RESULT", "FAILURE");
        let untagged = InboundEvent::new("r").with_field("RESULT", "SUCCESS");

        assert_eq!(spec.extract(&tagged), Some(json!("SUCCESS")));
        assert_eq!(spec.extract(&other), None);
        assert_eq!(spec.extract(&untagged), Some(json!("SUCCESS")));
    }

    #[test]
    fn test_custom_extractor() {
        fn only_strings(v: &Value) -> Option<Value> {
            v.as_str().map(|s| Value::String(s.to_string()))
        }
        let spec = FieldSpec::new("S").with_extractor(only_strings);

        assert_eq!(spec.extract(&InboundEvent::new("r").with_field("S", 5)), None);
        assert_eq!(
            spec.extract(&InboundEvent::new("r").with_field("S", "ok")),
            Some(json!("ok"))
        );
    }

    #[test]
    fn test_continuation_channel() {
        let (continuation, mut rx) = Continuation::channel();
        continuation.fail(CorrelationError::Closed);
        assert_eq!(rx.try_recv().unwrap(), Err(CorrelationError::Closed));
    }

    #[test]
    fn test_finish_leaves_pending_once() {
        let mut w = wait(&["A"]);
        assert_eq!(w.state(), WaitState::Pending);

        assert!(!w.finish(WaitState::Pending));
        assert_eq!(w.state(), WaitState::Pending);

        assert!(w.finish(WaitState::TimedOut));
        assert!(!w.finish(WaitState::Complete));
        assert_eq!(w.state(), WaitState::TimedOut);

        let (outcome, _) = w.into_outcome(Instant::now());
        assert!(outcome.timed_out);
        assert_eq!(outcome.missing, vec!["A".to_string()]);
    }
}
