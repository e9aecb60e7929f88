//! Command/response correlation over an unreliable broadcast channel.
//!
//! The correlator owns the pending-wait registry, a timer service and the
//! outbound channel. It is driven from a single execution context: callers
//! feed it [`Correlator::issue`], [`Correlator::handle_event`] and
//! [`Correlator::on_timer`] one at a time and each call runs to completion.
//! No locking happens here; see [`crate::host`] for a tokio task that provides
//! the serialisation.
//!
//! Every wait leaves the registry through exactly one of:
//!
//! | Path | Trigger | Continuation |
//! |------|---------|--------------|
//! | completion | all required fields collected | `resolve(outcome)` |
//! | timeout (strict) | deadline elapsed | `fail(Timeout)` |
//! | timeout (partial) | deadline elapsed | `resolve(outcome)` with `timed_out` |
//! | supersession | new wait issued on the same slot | `fail(Superseded)` |
//! | close | correlator shut down | `fail(Closed)` |

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::channel::{Channel, ChannelError};
use crate::config::IssueOptions;
use crate::error::{CorrelationError, Result};
use crate::event::{InboundEvent, OutboundCommand, Routes, Topic};
use crate::registry::PendingRegistry;
use crate::timer::{ManualTimer, TimerKey, TimerService};
use crate::wait::{Continuation, FieldSpec, Policy, Slot, Wait, WaitId, WaitState};

/// Everything needed to issue one wait.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub slot: Slot,
    pub fields: Vec<FieldSpec>,
    pub options: IssueOptions,
    /// Commands sent once the wait is registered, in order.
    pub commands: Vec<OutboundCommand>,
}

impl IssueRequest {
    pub fn new(slot: impl Into<Slot>, options: IssueOptions) -> Self {
        Self {
            slot: slot.into(),
            fields: Vec::new(),
            options,
            commands: Vec::new(),
        }
    }

    pub fn field(mut self, field: impl Into<FieldSpec>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn command(mut self, command: OutboundCommand) -> Self {
        self.commands.push(command);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(CorrelationError::InvalidRequest(format!(
                "wait on slot '{}' requires at least one field",
                self.slot
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.fields.iter().find(|f| !seen.insert(f.name())) {
            return Err(CorrelationError::InvalidRequest(format!(
                "field '{}' listed twice for slot '{}'",
                dup.name(),
                self.slot
            )));
        }
        if self.options.timeout.is_zero() {
            return Err(CorrelationError::InvalidRequest(format!(
                "wait on slot '{}' has a zero timeout",
                self.slot
            )));
        }
        Ok(())
    }
}

/// What [`Correlator::handle_event`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Unknown discriminator; dropped.
    Ignored,
    /// Data topic; the caller should forward it to its listeners.
    Data,
    /// Command-result topic. `matched` counts waits that gained at least one
    /// field, `completed` those that resolved because of this event.
    Result { matched: usize, completed: usize },
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrelatorStats {
    pub issued: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub partial: u64,
    pub superseded: u64,
    pub closed: u64,
    pub send_failures: u64,
    pub events_ignored: u64,
    pub events_unmatched: u64,
    pub stale_timers: u64,
}

impl CorrelatorStats {
    fn record(&mut self, state: WaitState) {
        match state {
            WaitState::Complete => self.completed += 1,
            WaitState::TimedOut => self.timed_out += 1,
            WaitState::Superseded => self.superseded += 1,
            WaitState::Closed => self.closed += 1,
            // Send failures are counted where they happen.
            WaitState::Failed | WaitState::Pending => {}
        }
    }
}

pub struct Correlator<T, C> {
    registry: PendingRegistry,
    routes: Routes,
    timer: T,
    channel: C,
    next_id: u64,
    stats: CorrelatorStats,
}

impl<T: TimerService, C: Channel> Correlator<T, C> {
    pub fn new(routes: Routes, timer: T, channel: C) -> Self {
        Self {
            registry: PendingRegistry::new(),
            routes,
            timer,
            channel,
            next_id: 0,
            stats: CorrelatorStats::default(),
        }
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn routes_mut(&mut self) -> &mut Routes {
        &mut self.routes
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn stats(&self) -> CorrelatorStats {
        self.stats
    }

    pub fn is_pending(&self, slot: &Slot) -> bool {
        self.registry.contains(slot)
    }

    pub fn pending_slots(&self) -> Vec<Slot> {
        self.registry.slots()
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// Look at a pending wait without touching it.
    pub fn pending(&self, slot: &Slot) -> Option<&Wait> {
        self.registry.get(slot)
    }

    /// Issue a wait and send its commands.
    ///
    /// Any wait already pending on the slot is failed with `Superseded` first.
    /// The new wait is registered and its timer armed before anything is sent,
    /// so a reply delivered right after the send always finds it.
    ///
    /// On error the continuation has already been failed with the same error
    /// and nothing stays registered.
    pub fn issue(&mut self, request: IssueRequest, continuation: Continuation) -> Result<WaitId> {
        if let Err(err) = request.validate() {
            continuation.fail(err.clone());
            return Err(err);
        }
        let IssueRequest {
            slot,
            fields,
            options,
            commands,
        } = request;

        if let Some(previous) = self.registry.remove(&slot) {
            warn!(slot = %slot, wait_id = %previous.id(), "Superseding pending wait");
            self.supersede(previous);
        }

        self.next_id += 1;
        let id = WaitId(self.next_id);
        let mut wait = Wait::new(
            id,
            slot.clone(),
            fields,
            options.policy,
            self.timer.now(),
            options.timeout,
            continuation,
        );
        let handle = self.timer.schedule(
            options.timeout,
            TimerKey {
                slot: slot.clone(),
                wait_id: id,
            },
        );
        wait.set_timer(handle);
        self.registry.insert(wait);
        self.stats.issued += 1;

        debug!(
            slot = %slot,
            wait_id = %id,
            timeout_ms = options.timeout.as_millis() as u64,
            policy = ?options.policy,
            commands = commands.len(),
            "Issued wait"
        );

        for command in &commands {
            if let Err(err) = self.channel.send(command) {
                return Err(self.abort_send(&slot, id, command, err));
            }
        }

        Ok(id)
    }

    /// Send a command nobody waits on.
    pub fn send(&mut self, command: &OutboundCommand) -> std::result::Result<(), ChannelError> {
        let result = self.channel.send(command);
        if let Err(err) = &result {
            self.stats.send_failures += 1;
            warn!(action = %command.action, error = %err, "Fire-and-forget send failed");
        }
        result
    }

    /// Route one inbound event.
    pub fn handle_event(&mut self, event: &InboundEvent) -> Disposition {
        match self.routes.topic_of(event.action()) {
            None => {
                self.stats.events_ignored += 1;
                trace!(action = %event.action(), "Ignoring event on unrouted action");
                Disposition::Ignored
            }
            Some(Topic::Data) => Disposition::Data,
            Some(Topic::CommandResult) => self.correlate(event),
        }
    }

    /// Timeout path for a fired timer. Keys for waits that already resolved,
    /// or whose slot now holds a newer wait, are ignored.
    pub fn on_timer(&mut self, key: TimerKey) {
        match self.registry.remove_if(&key.slot, key.wait_id) {
            Some(wait) => self.time_out(wait),
            None => {
                self.stats.stale_timers += 1;
                trace!(slot = %key.slot, wait_id = %key.wait_id, "Ignoring stale timer");
            }
        }
    }

    /// Fail every pending wait with `Closed`.
    pub fn close(&mut self) {
        let waits = self.registry.drain();
        if !waits.is_empty() {
            debug!(count = waits.len(), "Closing correlator with pending waits");
        }
        for mut wait in waits {
            self.finish(&mut wait, WaitState::Closed);
            wait.into_continuation().fail(CorrelationError::Closed);
        }
    }

    fn correlate(&mut self, event: &InboundEvent) -> Disposition {
        self.expire_overdue();

        let mut matched = 0;
        let mut ready = Vec::new();
        for wait in self.registry.iter_mut() {
            let absorbed = wait.absorb(event);
            if absorbed == 0 {
                continue;
            }
            matched += 1;
            trace!(
                slot = %wait.slot(),
                wait_id = %wait.id(),
                absorbed,
                missing = wait.missing().len(),
                "Collected fields"
            );
            if wait.is_complete() {
                ready.push((wait.slot().clone(), wait.id()));
            }
        }

        let mut completed = 0;
        for (slot, id) in ready {
            if let Some(wait) = self.registry.remove_if(&slot, id) {
                self.complete(wait);
                completed += 1;
            }
        }

        if matched == 0 {
            self.stats.events_unmatched += 1;
            trace!(
                action = %event.action(),
                tag = event.command_tag().unwrap_or("-"),
                "Result matched no pending wait"
            );
        }

        Disposition::Result { matched, completed }
    }

    /// Resolve waits whose deadline passed while their timer is still queued.
    fn expire_overdue(&mut self) {
        let now = self.timer.now();
        let overdue: Vec<(Slot, WaitId)> = self
            .registry
            .iter()
            .filter(|wait| wait.deadline() <= now)
            .map(|wait| (wait.slot().clone(), wait.id()))
            .collect();

        for (slot, id) in overdue {
            if let Some(wait) = self.registry.remove_if(&slot, id) {
                self.time_out(wait);
            }
        }
    }

    fn complete(&mut self, mut wait: Wait) {
        self.finish(&mut wait, WaitState::Complete);
        let (outcome, continuation) = wait.into_outcome(self.timer.now());
        debug!(
            slot = %outcome.slot,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Wait complete"
        );
        continuation.resolve(outcome);
    }

    fn time_out(&mut self, mut wait: Wait) {
        self.finish(&mut wait, WaitState::TimedOut);
        let policy = wait.policy();
        let (outcome, continuation) = wait.into_outcome(self.timer.now());

        match policy {
            Policy::Strict => {
                debug!(slot = %outcome.slot, missing = ?outcome.missing, "Wait timed out");
                continuation.fail(CorrelationError::Timeout {
                    after_ms: outcome.elapsed.as_millis() as u64,
                    slot: outcome.slot,
                });
            }
            Policy::Partial => {
                debug!(
                    slot = %outcome.slot,
                    collected = outcome.fields.len(),
                    missing = ?outcome.missing,
                    "Wait timed out, resolving with partial result"
                );
                self.stats.partial += 1;
                continuation.resolve(outcome);
            }
        }
    }

    fn supersede(&mut self, mut wait: Wait) {
        self.finish(&mut wait, WaitState::Superseded);
        let slot = wait.slot().clone();
        wait.into_continuation()
            .fail(CorrelationError::Superseded { slot });
    }

    fn abort_send(
        &mut self,
        slot: &Slot,
        id: WaitId,
        command: &OutboundCommand,
        err: ChannelError,
    ) -> CorrelationError {
        self.stats.send_failures += 1;
        warn!(slot = %slot, action = %command.action, error = %err, "Send failed, dropping wait");
        let error = CorrelationError::ChannelUnavailable(err.to_string());
        if let Some(mut wait) = self.registry.remove_if(slot, id) {
            self.finish(&mut wait, WaitState::Failed);
            wait.into_continuation().fail(error.clone());
        }
        error
    }

    /// Move a wait that was just removed from the registry to its terminal
    /// state and disarm its timer.
    fn finish(&mut self, wait: &mut Wait, state: WaitState) {
        if wait.finish(state) {
            self.stats.record(state);
        }
        if let Some(handle) = wait.take_timer() {
            self.timer.cancel(handle);
        }
    }
}

impl<C: Channel> Correlator<ManualTimer, C> {
    /// Advance the virtual clock and run the timeout path for every timer that
    /// fires. Returns the number of timers fired.
    pub fn advance(&mut self, by: std::time::Duration) -> usize {
        let fired = self.timer.advance(by);
        let count = fired.len();
        for key in fired {
            self.on_timer(key);
        }
        count
    }
}

impl<T, C> std::fmt::Debug for Correlator<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.registry.len())
            .field("routes", &self.routes)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RecordingChannel;
    use std::time::Duration;

    fn correlator() -> Correlator<ManualTimer, RecordingChannel> {
        let mut routes = Routes::new();
        routes.add("result", Topic::CommandResult).add("scan", Topic::Data);
        Correlator::new(routes, ManualTimer::new(), RecordingChannel::new())
    }

    #[test]
    fn test_issue_rejects_empty_fields() {
        let mut c = correlator();
        let (continuation, mut rx) = Continuation::channel();

        let request = IssueRequest::new("s", IssueOptions::default());
        let err = c.issue(request, continuation).unwrap_err();

        assert!(matches!(err, CorrelationError::InvalidRequest(_)));
        assert_eq!(rx.try_recv().unwrap(), Err(err));
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn test_issue_rejects_duplicate_fields() {
        let mut c = correlator();
        let request = IssueRequest::new("s", IssueOptions::default())
            .field("A")
            .field("A");
        assert!(c.issue(request, Continuation::new(|_| {})).is_err());
    }

    #[test]
    fn test_issue_rejects_zero_timeout() {
        let mut c = correlator();
        let request = IssueRequest::new("s", IssueOptions::strict(Duration::ZERO)).field("A");
        assert!(c.issue(request, Continuation::new(|_| {})).is_err());
    }

    #[test]
    fn test_routing() {
        let mut c = correlator();
        assert_eq!(c.handle_event(&InboundEvent::new("other")), Disposition::Ignored);
        assert_eq!(c.handle_event(&InboundEvent::new("scan")), Disposition::Data);
        assert_eq!(
            c.handle_event(&InboundEvent::new("result")),
            Disposition::Result {
                matched: 0,
                completed: 0
            }
        );
        assert_eq!(c.stats().events_ignored, 1);
        assert_eq!(c.stats().events_unmatched, 1);
    }

    #[test]
    fn test_data_event_does_not_touch_waits() {
        let mut c = correlator();
        let (continuation, mut rx) = Continuation::channel();
        c.issue(
            IssueRequest::new("s", IssueOptions::default()).field("A"),
            continuation,
        )
        .unwrap();

        c.handle_event(&InboundEvent::new("scan").with_field("A", 1));
        assert!(rx.try_recv().is_err());
        assert!(c.is_pending(&Slot::new("s")));
    }

    #[test]
    fn test_send_failure_finishes_wait_without_timeout() {
        let mut c = correlator();
        c.issue(
            IssueRequest::new("s", IssueOptions::default()).field("A"),
            Continuation::new(|_| {}),
        )
        .unwrap();
        assert_eq!(c.pending(&Slot::new("s")).unwrap().state(), WaitState::Pending);

        c.channel()
            .fail_with(Some(ChannelError::Unavailable("down".into())));
        let request = IssueRequest::new("s", IssueOptions::default())
            .field("A")
            .command(OutboundCommand::new("query"));
        let err = c.issue(request, Continuation::new(|_| {})).unwrap_err();

        assert!(matches!(err, CorrelationError::ChannelUnavailable(_)));
        assert_eq!(c.pending_count(), 0);
        assert_eq!(c.timer().armed(), 0);
        let stats = c.stats();
        assert_eq!(stats.superseded, 1);
        assert_eq!(stats.send_failures, 1);
        assert_eq!(stats.timed_out + stats.completed + stats.closed, 0);
    }

    #[test]
    fn test_timer_armed_and_cancelled() {
        let mut c = correlator();
        c.issue(
            IssueRequest::new("s", IssueOptions::default()).field("A"),
            Continuation::new(|_| {}),
        )
        .unwrap();
        assert_eq!(c.timer().armed(), 1);

        c.handle_event(&InboundEvent::new("result").with_field("A", "x"));
        assert_eq!(c.timer().armed(), 0);
        assert_eq!(c.stats().completed, 1);
    }
}
