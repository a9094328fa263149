// Producer - write side of the broker
// Request-handling code holds a clone and enqueues without waiting on handlers

use crate::application::config::OverflowPolicy;
use crate::application::queue::{EnqueueError, QueueWriter};
use crate::application::stats::{BrokerStats, StatsSnapshot};
use crate::domain::{Envelope, MessageId, Notification, TraceId};
use crate::port::{IdProvider, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Injectable enqueue handle
#[derive(Clone)]
pub struct Producer {
    writer: QueueWriter,
    overflow: OverflowPolicy,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    stats: Arc<BrokerStats>,
}

impl Producer {
    pub(crate) fn new(
        writer: QueueWriter,
        overflow: OverflowPolicy,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        stats: Arc<BrokerStats>,
    ) -> Self {
        Self {
            writer,
            overflow,
            id_provider,
            time_provider,
            stats,
        }
    }

    /// Build an envelope stamped with a fresh id and the current time
    pub fn envelope<N: Notification>(&self, trace_id: Option<TraceId>, notification: N) -> Envelope {
        Envelope::new(
            self.id_provider.generate_id(),
            trace_id,
            self.time_provider.now_millis(),
            notification,
        )
    }

    /// Enqueue a notification, returning the id it was given
    pub async fn publish<N: Notification>(
        &self,
        trace_id: Option<TraceId>,
        notification: N,
    ) -> Result<MessageId, EnqueueError> {
        let envelope = self.envelope(trace_id, notification);
        let id = envelope.id().to_string();
        self.enqueue(envelope).await?;
        Ok(id)
    }

    /// Hand an envelope to the consumer pool.
    ///
    /// On success exactly one consumer will receive it. When the queue is
    /// bounded and full the configured [`OverflowPolicy`] decides whether this
    /// waits, waits for a while, or fails straight away.
    pub async fn enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        let id = envelope.id().to_string();
        let trace_id = envelope.trace_label().to_string();
        let message_type = envelope.message_type();

        let result = match self.overflow {
            OverflowPolicy::Wait => self.writer.send(envelope).await,
            OverflowPolicy::WaitFor { timeout_ms } => {
                self.writer
                    .send_timeout(envelope, Duration::from_millis(timeout_ms))
                    .await
            }
            OverflowPolicy::Reject => self.writer.try_send(envelope),
        };

        self.record(&id, &trace_id, &message_type.to_string(), &result);
        result
    }

    /// Enqueue without ever waiting, whatever the overflow policy
    pub fn try_enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        let id = envelope.id().to_string();
        let trace_id = envelope.trace_label().to_string();
        let message_type = envelope.message_type();

        let result = self.writer.try_send(envelope);
        self.record(&id, &trace_id, &message_type.to_string(), &result);
        result
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn record(&self, id: &str, trace_id: &str, message_type: &str, result: &Result<(), EnqueueError>) {
        match result {
            Ok(()) => {
                self.stats.record_enqueued();
                debug!(message_id = %id, trace_id = %trace_id, message_type = %message_type, "Message enqueued");
            }
            Err(e) => {
                self.stats.record_rejected();
                warn!(
                    message_id = %id,
                    trace_id = %trace_id,
                    message_type = %message_type,
                    error = %e,
                    "Enqueue rejected"
                );
            }
        }
    }
}
