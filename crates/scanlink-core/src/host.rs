//! Tokio host for a [`Correlator`].
//!
//! One task owns the correlator and its [`TokioTimer`]. Issues, inbound events,
//! route changes and fired timers are all funnelled into that task, so the
//! correlator only ever sees one call at a time. Callers talk to it through a
//! cloneable [`HostHandle`].

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelError};
use crate::config::{ConfigError, EngineConfig};
use crate::correlator::{Correlator, CorrelatorStats, Disposition, IssueRequest};
use crate::error::{CorrelationError, Result};
use crate::event::{InboundEvent, OutboundCommand, Topic};
use crate::timer::{TimerKey, TokioTimer};
use crate::wait::{Continuation, WaitOutcome};

/// Capacity of the data and result broadcast streams.
pub const DEFAULT_STREAM_CAPACITY: usize = 256;

enum HostMessage {
    Issue {
        request: IssueRequest,
        continuation: Continuation,
    },
    Send {
        command: OutboundCommand,
        reply: oneshot::Sender<std::result::Result<(), ChannelError>>,
    },
    Event(InboundEvent),
    Route {
        action: String,
        topic: Option<Topic>,
    },
    Stats(oneshot::Sender<CorrelatorStats>),
    Shutdown,
}

/// Spawns correlator host tasks.
#[derive(Debug)]
pub struct CorrelatorHost;

impl CorrelatorHost {
    /// Validate `config`, then spawn the host task on the current runtime.
    pub fn spawn<C>(
        config: &EngineConfig,
        channel: C,
    ) -> std::result::Result<(HostHandle, JoinHandle<()>), ConfigError>
    where
        C: Channel + 'static,
    {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.host_queue_capacity);
        let (data, _) = broadcast::channel(DEFAULT_STREAM_CAPACITY);
        let (results, _) = broadcast::channel(DEFAULT_STREAM_CAPACITY);
        let (timer, fired) = TokioTimer::new();
        let correlator = Correlator::new(config.routes(), timer, channel);

        let handle = HostHandle {
            tx,
            data: data.downgrade(),
            results: results.downgrade(),
        };
        let task = tokio::spawn(run(correlator, rx, fired, data, results));
        info!(routes = config.routes().len(), "Correlator host started");

        Ok((handle, task))
    }
}

async fn run<C: Channel>(
    mut correlator: Correlator<TokioTimer, C>,
    mut rx: mpsc::Receiver<HostMessage>,
    mut fired: mpsc::UnboundedReceiver<TimerKey>,
    data: broadcast::Sender<InboundEvent>,
    results: broadcast::Sender<InboundEvent>,
) {
    loop {
        tokio::select! {
            biased;
            Some(key) = fired.recv() => correlator.on_timer(key),
            message = rx.recv() => {
                let Some(message) = message else { break };
                match message {
                    HostMessage::Issue { request, continuation } => {
                        // The continuation has already seen any error.
                        let _ = correlator.issue(request, continuation);
                    }
                    HostMessage::Send { command, reply } => {
                        let _ = reply.send(correlator.send(&command));
                    }
                    HostMessage::Event(event) => match correlator.handle_event(&event) {
                        Disposition::Data => {
                            let _ = data.send(event);
                        }
                        Disposition::Result { .. } => {
                            let _ = results.send(event);
                        }
                        Disposition::Ignored => {}
                    },
                    HostMessage::Route { action, topic } => {
                        debug!(action = %action, topic = ?topic, "Updating route");
                        match topic {
                            Some(topic) => {
                                correlator.routes_mut().add(action, topic);
                            }
                            None => {
                                correlator.routes_mut().remove(&action);
                            }
                        }
                    }
                    HostMessage::Stats(reply) => {
                        let _ = reply.send(correlator.stats());
                    }
                    HostMessage::Shutdown => break,
                }
            }
        }
    }

    correlator.close();
    info!(stats = ?correlator.stats(), "Correlator host stopped");
}

/// Handle to a running correlator host.
///
/// The host task owns the only strong stream senders, so every subscription
/// closes once the task exits.
#[derive(Debug, Clone)]
pub struct HostHandle {
    tx: mpsc::Sender<HostMessage>,
    data: broadcast::WeakSender<InboundEvent>,
    results: broadcast::WeakSender<InboundEvent>,
}

impl std::fmt::Debug for HostMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Issue { request, .. } => write!(f, "Issue({})", request.slot),
            Self::Send { command, .. } => write!(f, "Send({})", command.action),
            Self::Event(event) => write!(f, "Event({})", event.action),
            Self::Route { action, .. } => write!(f, "Route({})", action),
            Self::Stats(_) => f.write_str("Stats"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl HostHandle {
    /// Issue a wait and await its resolution.
    pub async fn issue(&self, request: IssueRequest) -> Result<WaitOutcome> {
        let (continuation, rx) = Continuation::channel();
        self.post(HostMessage::Issue {
            request,
            continuation,
        })
        .await?;
        rx.await.map_err(|_| CorrelationError::Closed)?
    }

    /// Issue a wait and return immediately; the continuation runs on the host task.
    pub async fn issue_with(&self, request: IssueRequest, continuation: Continuation) -> Result<()> {
        self.tx
            .send(HostMessage::Issue {
                request,
                continuation,
            })
            .await
            .map_err(|err| {
                // Host is gone: the continuation comes back inside the error.
                if let HostMessage::Issue { continuation, .. } = err.0 {
                    continuation.fail(CorrelationError::Closed);
                }
                CorrelationError::Closed
            })
    }

    /// Send a command that nobody waits on.
    pub async fn send(&self, command: OutboundCommand) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.post(HostMessage::Send { command, reply }).await?;
        rx.await
            .map_err(|_| CorrelationError::Closed)?
            .map_err(|err| CorrelationError::ChannelUnavailable(err.to_string()))
    }

    /// Hand an inbound event to the correlator.
    pub async fn deliver(&self, event: InboundEvent) -> Result<()> {
        self.post(HostMessage::Event(event)).await
    }

    /// Non-async delivery for callers outside the runtime. Returns `false` if
    /// the queue is full or the host is gone; the event is then lost, which
    /// the engine tolerates like any other dropped broadcast.
    pub fn try_deliver(&self, event: InboundEvent) -> bool {
        match self.tx.try_send(HostMessage::Event(event)) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Dropping inbound event");
                false
            }
        }
    }

    pub async fn add_route(&self, action: impl Into<String>, topic: Topic) -> Result<()> {
        self.post(HostMessage::Route {
            action: action.into(),
            topic: Some(topic),
        })
        .await
    }

    pub async fn remove_route(&self, action: impl Into<String>) -> Result<()> {
        self.post(HostMessage::Route {
            action: action.into(),
            topic: None,
        })
        .await
    }

    /// Events on data-topic actions, in delivery order. The receiver reports
    /// `Closed` once the host has stopped.
    pub fn subscribe_data(&self) -> broadcast::Receiver<InboundEvent> {
        subscribe(&self.data)
    }

    /// Every command-result event after it has been correlated.
    pub fn subscribe_results(&self) -> broadcast::Receiver<InboundEvent> {
        subscribe(&self.results)
    }

    pub async fn stats(&self) -> Result<CorrelatorStats> {
        let (reply, rx) = oneshot::channel();
        self.post(HostMessage::Stats(reply)).await?;
        rx.await.map_err(|_| CorrelationError::Closed)
    }

    /// Stop the host. Pending waits fail with `Closed`.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(HostMessage::Shutdown).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn post(&self, message: HostMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| CorrelationError::Closed)
    }
}

fn subscribe(stream: &broadcast::WeakSender<InboundEvent>) -> broadcast::Receiver<InboundEvent> {
    match stream.upgrade() {
        Some(sender) => sender.subscribe(),
        None => {
            // Host already stopped: hand out a receiver that is closed from the start.
            let (_, rx) = broadcast::channel(1);
            rx
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RecordingChannel;
    use crate::config::IssueOptions;
    use std::time::Duration;

    fn config() -> EngineConfig {
        EngineConfig {
            result_actions: vec!["result".into()],
            data_actions: vec!["scan".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_config() {
        let config = EngineConfig {
            host_queue_capacity: 0,
            ..Default::default()
        };
        assert!(CorrelatorHost::spawn(&config, RecordingChannel::new()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_events_are_forwarded() {
        let (handle, _task) = CorrelatorHost::spawn(&config(), RecordingChannel::new()).unwrap();
        let mut data = handle.subscribe_data();

        handle
            .deliver(InboundEvent::new("scan").with_field("data", "123"))
            .await
            .unwrap();

        let event = data.recv().await.unwrap();
        assert_eq!(event.str_field("data"), Some("123"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_pending() {
        let (handle, task) = CorrelatorHost::spawn(&config(), RecordingChannel::new()).unwrap();

        let issuer = handle.clone();
        let pending = tokio::spawn(async move {
            issuer
                .issue(
                    IssueRequest::new("s", IssueOptions::strict(Duration::from_secs(60)))
                        .field("A"),
                )
                .await
        });
        tokio::task::yield_now().await;
        // Make sure the issue was processed before shutting down
        handle.stats().await.unwrap();

        handle.shutdown().await;
        task.await.unwrap();

        assert_eq!(pending.await.unwrap(), Err(CorrelationError::Closed));
        assert!(handle.deliver(InboundEvent::new("result")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_close_when_host_stops() {
        let (handle, task) = CorrelatorHost::spawn(&config(), RecordingChannel::new()).unwrap();
        let mut data = handle.subscribe_data();
        let mut results = handle.subscribe_results();

        handle.shutdown().await;
        task.await.unwrap();

        assert!(matches!(data.recv().await, Err(broadcast::error::RecvError::Closed)));
        assert!(matches!(results.recv().await, Err(broadcast::error::RecvError::Closed)));

        // Subscribing after the host stopped yields an already-closed stream.
        let mut late = handle.subscribe_data();
        assert!(matches!(late.recv().await, Err(broadcast::error::RecvError::Closed)));
    }
}
