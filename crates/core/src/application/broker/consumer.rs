// Consumer - one competing worker of the pool

use super::panic_guard::{execute_guarded, PanicGuardResult};
use super::shutdown::ShutdownToken;
use crate::application::queue::QueueReader;
use crate::application::stats::BrokerStats;
use crate::domain::Envelope;
use crate::port::{DispatchError, Dispatcher, ScopeProvider};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Stable index of a consumer inside the pool (diagnostics only)
pub type ConsumerId = usize;

/// Consumer lifecycle
///
/// `Idle → Dequeuing → Dispatching → Idle`, until `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerState {
    Idle,
    Dequeuing,
    Dispatching,
    Stopped,
}

impl ConsumerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConsumerState::Idle,
            1 => ConsumerState::Dequeuing,
            2 => ConsumerState::Dispatching,
            _ => ConsumerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConsumerState::Idle => 0,
            ConsumerState::Dequeuing => 1,
            ConsumerState::Dispatching => 2,
            ConsumerState::Stopped => 3,
        }
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerState::Idle => write!(f, "IDLE"),
            ConsumerState::Dequeuing => write!(f, "DEQUEUING"),
            ConsumerState::Dispatching => write!(f, "DISPATCHING"),
            ConsumerState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Observable state slot, written by the consumer and read by the broker
#[derive(Debug, Clone, Default)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn get(&self) -> ConsumerState {
        ConsumerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ConsumerState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// Result of dispatching one message
#[derive(Debug)]
pub enum DispatchOutcome {
    /// At least one handler ran and all succeeded
    Handled { handlers: usize },
    /// No handler registered for the message type
    Unhandled,
    /// A handler (or scope creation) returned an error
    Failed(DispatchError),
    /// The dispatch panicked
    Panicked(String),
}

/// Why a consumer loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// Shutdown signal observed
    Cancelled,
    /// Every producer is gone and the backlog is empty
    QueueClosed,
}

pub(crate) struct Consumer {
    id: ConsumerId,
    queue: QueueReader,
    dispatcher: Arc<dyn Dispatcher>,
    scopes: Arc<dyn ScopeProvider>,
    stats: Arc<BrokerStats>,
    state: StateCell,
}

impl Consumer {
    pub(crate) fn new(
        id: ConsumerId,
        queue: QueueReader,
        dispatcher: Arc<dyn Dispatcher>,
        scopes: Arc<dyn ScopeProvider>,
        stats: Arc<BrokerStats>,
    ) -> Self {
        Self {
            id,
            queue,
            dispatcher,
            scopes,
            stats,
            state: StateCell::default(),
        }
    }

    pub(crate) fn id(&self) -> ConsumerId {
        self.id
    }

    pub(crate) fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    /// Read loop: one message at a time until shutdown or queue closure.
    ///
    /// Shutdown is checked before every dequeue and raced against the wait
    /// for the next message; a dispatch already under way always completes.
    pub(crate) async fn run(self, mut shutdown: ShutdownToken) -> ConsumerExit {
        info!(consumer = self.id, "Consumer started");
        let exit = loop {
            // Check for shutdown signal
            if shutdown.is_shutdown() {
                break ConsumerExit::Cancelled;
            }

            self.state.set(ConsumerState::Dequeuing);
            let next = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    debug!(consumer = self.id, "Consumer interrupted while waiting for messages");
                    break ConsumerExit::Cancelled;
                }
                next = self.queue.recv() => next,
            };

            let Some(envelope) = next else {
                break ConsumerExit::QueueClosed;
            };

            self.state.set(ConsumerState::Dispatching);
            self.process(envelope).await;
            self.state.set(ConsumerState::Idle);
        };
        self.state.set(ConsumerState::Stopped);
        info!(consumer = self.id, reason = ?exit, "Consumer stopped");
        exit
    }

    /// Dispatch one message and log the outcome; never fails
    pub(crate) async fn process(&self, envelope: Envelope) -> DispatchOutcome {
        let span = info_span!(
            "dispatch",
            consumer = self.id,
            message_id = %envelope.id(),
            message_type = %envelope.message_type(),
            trace_id = %envelope.trace_label(),
        );

        async {
            self.stats.dispatch_started();
            let outcome = self.dispatch(&envelope).await;
            self.stats.dispatch_finished();
            self.report(&envelope, &outcome);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, envelope: &Envelope) -> DispatchOutcome {
        let scopes = Arc::clone(&self.scopes);
        let dispatcher = Arc::clone(&self.dispatcher);
        let envelope = envelope.clone();
        // Scope factories are user code too, so they run under the guard
        let task = async move {
            let scope = scopes.create_scope()?;
            dispatcher.dispatch(&envelope, &scope).await
        };

        match execute_guarded(task.in_current_span()).await {
            PanicGuardResult::Success(Ok(0)) => DispatchOutcome::Unhandled,
            PanicGuardResult::Success(Ok(handlers)) => DispatchOutcome::Handled { handlers },
            PanicGuardResult::Success(Err(e)) => DispatchOutcome::Failed(e),
            PanicGuardResult::Panicked(msg) => DispatchOutcome::Panicked(msg),
        }
    }

    fn report(&self, envelope: &Envelope, outcome: &DispatchOutcome) {
        let trace_id = envelope.trace_label();
        match outcome {
            DispatchOutcome::Handled { handlers } => {
                self.stats.record_dispatched();
                debug!(consumer = self.id, trace_id = %trace_id, handlers = handlers, "Message handled");
            }
            DispatchOutcome::Unhandled => {
                self.stats.record_unhandled();
                warn!(
                    consumer = self.id,
                    trace_id = %trace_id,
                    message_type = %envelope.message_type(),
                    "No handler for message; dropped"
                );
            }
            DispatchOutcome::Failed(e) => {
                self.stats.record_failed();
                error!(
                    consumer = self.id,
                    trace_id = %trace_id,
                    message_id = %envelope.id(),
                    error = %e,
                    "Dispatch failed; message dropped"
                );
            }
            DispatchOutcome::Panicked(msg) => {
                self.stats.record_panicked();
                error!(
                    consumer = self.id,
                    trace_id = %trace_id,
                    message_id = %envelope.id(),
                    panic_msg = %msg,
                    "Dispatch panicked; message dropped"
                );
            }
        }
    }
}
