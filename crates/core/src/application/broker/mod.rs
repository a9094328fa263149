// Broker - lifecycle owner of the consumer pool

pub mod constants;
mod consumer;
mod panic_guard;
mod shutdown;

pub use consumer::{ConsumerExit, ConsumerId, ConsumerState, DispatchOutcome};
pub use panic_guard::{execute_guarded, panic_message, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

pub(crate) use consumer::Consumer;

use crate::application::stats::{BrokerStats, StatsSnapshot};
use crate::error::{AppError, Result};
use consumer::StateCell;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How the consumer pool ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerReport {
    /// Consumers that observed the shutdown signal
    pub cancelled: usize,
    /// Consumers that ran out of producers and drained the queue
    pub queue_closed: usize,
    /// Consumers whose task died (panic outside a dispatch); never restarted
    pub lost: Vec<ConsumerId>,
}

/// Background host of the N consumer loops.
///
/// The broker runs no per-message logic itself: it starts every consumer,
/// waits for all of them, and relays the shutdown signal.
pub struct Broker {
    consumers: Vec<Consumer>,
    states: Vec<(ConsumerId, StateCell)>,
    stats: Arc<BrokerStats>,
    shutdown_tx: ShutdownSender,
    shutdown_rx: ShutdownToken,
    supervisor: Option<JoinHandle<BrokerReport>>,
    shutdown_grace: Duration,
}

impl Broker {
    pub(crate) fn new(
        consumers: Vec<Consumer>,
        stats: Arc<BrokerStats>,
        shutdown_grace: Duration,
    ) -> Self {
        let states = consumers.iter().map(|c| (c.id(), c.state_cell())).collect();
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        Self {
            consumers,
            states,
            stats,
            shutdown_tx,
            shutdown_rx,
            supervisor: None,
            shutdown_grace,
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.states.len()
    }

    /// True between `start` and `stop`
    pub fn is_running(&self) -> bool {
        self.supervisor
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Handle that can stop the pool from elsewhere (e.g. a signal listener)
    pub fn shutdown_handle(&self) -> ShutdownSender {
        self.shutdown_tx.clone()
    }

    pub fn consumer_states(&self) -> Vec<(ConsumerId, ConsumerState)> {
        self.states.iter().map(|(id, cell)| (*id, cell.get())).collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Launch every consumer as a background task and return immediately
    pub fn start(&mut self) -> Result<()> {
        let consumers = self.take_consumers()?;
        info!(consumers = consumers.len(), "Starting broker");
        let tasks = spawn_consumers(consumers, &self.shutdown_rx);
        self.supervisor = Some(tokio::spawn(supervise(
            tasks,
            self.shutdown_rx.clone(),
            Arc::clone(&self.stats),
        )));
        Ok(())
    }

    /// Run the pool on the caller's task until every consumer has exited.
    ///
    /// Stop it with the sender from [`Broker::shutdown_handle`].
    pub async fn run(mut self) -> Result<BrokerReport> {
        let consumers = self.take_consumers()?;
        info!(consumers = consumers.len(), "Running broker in foreground");
        let tasks = spawn_consumers(consumers, &self.shutdown_rx);
        let report = supervise(tasks, self.shutdown_rx.clone(), Arc::clone(&self.stats)).await;
        self.mark_stopped();
        Ok(report)
    }

    /// Signal shutdown and wait for every consumer.
    ///
    /// In-flight dispatches finish; no consumer starts a new dequeue.
    pub async fn stop(&mut self) -> Result<BrokerReport> {
        self.shutdown_tx.shutdown();
        let handle = self.take_supervisor()?;
        let report = handle
            .await
            .map_err(|e| AppError::Internal(format!("Broker supervisor failed: {}", e)))?;
        self.mark_stopped();
        Ok(report)
    }

    /// `stop` with the configured grace period
    pub async fn shutdown(&mut self) -> Result<BrokerReport> {
        self.stop_with_grace(self.shutdown_grace).await
    }

    /// `stop`, giving up after `grace`
    ///
    /// On timeout `AppError::ShutdownTimeout` is returned and the broker keeps
    /// running its draining consumers; a later `stop` waits for them.
    pub async fn stop_with_grace(&mut self, grace: Duration) -> Result<BrokerReport> {
        self.shutdown_tx.shutdown();
        let mut handle = self.take_supervisor()?;
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(joined) => {
                let report = joined
                    .map_err(|e| AppError::Internal(format!("Broker supervisor failed: {}", e)))?;
                self.mark_stopped();
                Ok(report)
            }
            Err(_) => {
                let stuck: Vec<_> = self
                    .consumer_states()
                    .into_iter()
                    .filter(|(_, state)| *state != ConsumerState::Stopped)
                    .collect();
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    stuck = ?stuck,
                    "Broker shutdown exceeded grace period"
                );
                self.supervisor = Some(handle);
                Err(AppError::ShutdownTimeout(grace))
            }
        }
    }

    fn take_consumers(&mut self) -> Result<Vec<Consumer>> {
        if self.supervisor.is_some() {
            return Err(AppError::InvalidState("Broker already started".to_string()));
        }
        if self.consumers.is_empty() {
            return Err(AppError::InvalidState(
                "Broker already stopped; consumers cannot be restarted".to_string(),
            ));
        }
        Ok(std::mem::take(&mut self.consumers))
    }

    fn take_supervisor(&mut self) -> Result<JoinHandle<BrokerReport>> {
        self.supervisor
            .take()
            .ok_or_else(|| AppError::InvalidState("Broker is not running".to_string()))
    }

    fn mark_stopped(&self) {
        for (_, cell) in &self.states {
            cell.set(ConsumerState::Stopped);
        }
    }
}

fn spawn_consumers(
    consumers: Vec<Consumer>,
    shutdown: &ShutdownToken,
) -> Vec<(ConsumerId, JoinHandle<ConsumerExit>)> {
    consumers
        .into_iter()
        .map(|consumer| (consumer.id(), tokio::spawn(consumer.run(shutdown.clone()))))
        .collect()
}

/// Await all consumer tasks concurrently, logging each exit as it happens.
async fn supervise(
    tasks: Vec<(ConsumerId, JoinHandle<ConsumerExit>)>,
    shutdown: ShutdownToken,
    stats: Arc<BrokerStats>,
) -> BrokerReport {
    let mut running: FuturesUnordered<_> = tasks
        .into_iter()
        .map(|(id, handle)| async move { (id, handle.await) })
        .collect();

    let mut report = BrokerReport::default();
    while let Some((id, joined)) = running.next().await {
        match joined {
            Ok(ConsumerExit::Cancelled) => report.cancelled += 1,
            Ok(ConsumerExit::QueueClosed) => report.queue_closed += 1,
            Err(join_err) => {
                stats.record_consumer_lost();
                report.lost.push(id);
                let reason = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    join_err.to_string()
                };
                error!(
                    consumer = id,
                    error = %reason,
                    remaining = running.len(),
                    "Consumer terminated unexpectedly; not restarting"
                );
                if running.is_empty() && !shutdown.is_shutdown() {
                    error!("No consumers left; broker is no longer consuming");
                }
            }
        }
    }

    info!(
        cancelled = report.cancelled,
        queue_closed = report.queue_closed,
        lost = report.lost.len(),
        "Broker stopped"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::queue::{message_queue, QueueCapacity, QueueWriter};
    use crate::application::scope::ScopedServices;
    use crate::domain::{Envelope, Notification};
    use crate::port::dispatcher::mocks::MockDispatcher;

    #[derive(Debug)]
    struct AppOpened;
    impl Notification for AppOpened {}

    fn broker(n: usize, dispatcher: Arc<MockDispatcher>) -> (Broker, QueueWriter) {
        let (writer, reader) = message_queue(QueueCapacity::Unbounded);
        let stats = Arc::new(BrokerStats::new());
        let consumers = (0..n)
            .map(|id| {
                Consumer::new(
                    id,
                    reader.clone(),
                    dispatcher.clone(),
                    Arc::new(ScopedServices::new()),
                    stats.clone(),
                )
            })
            .collect();
        (Broker::new(consumers, stats, Duration::from_secs(1)), writer)
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let dispatcher = Arc::new(MockDispatcher::new_success());
        let (mut broker, writer) = broker(3, dispatcher.clone());
        broker.start().unwrap();
        assert!(broker.is_running());

        for i in 0..10 {
            writer
                .send(Envelope::new(i.to_string(), None, 0, AppOpened))
                .await
                .unwrap();
        }
        while broker.stats().completed() < 10 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let report = broker.stop().await.unwrap();
        assert_eq!(report.cancelled, 3);
        assert!(report.lost.is_empty());
        assert_eq!(dispatcher.call_count(), 10);
        assert!(broker
            .consumer_states()
            .iter()
            .all(|(_, state)| *state == ConsumerState::Stopped));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (mut broker, _writer) = broker(1, Arc::new(MockDispatcher::new_success()));
        broker.start().unwrap();
        assert!(matches!(broker.start(), Err(AppError::InvalidState(_))));
        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_rejected() {
        let (mut broker, _writer) = broker(1, Arc::new(MockDispatcher::new_success()));
        assert!(matches!(broker.stop().await, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_run_in_foreground_until_handle_fires() {
        let (broker, _writer) = broker(2, Arc::new(MockDispatcher::new_success()));
        let handle = broker.shutdown_handle();

        let running = tokio::spawn(broker.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown();

        let report = running.await.unwrap().unwrap();
        assert_eq!(report.cancelled, 2);
    }

    #[tokio::test]
    async fn test_pool_ends_when_producers_gone() {
        let (mut broker, writer) = broker(2, Arc::new(MockDispatcher::new_success()));
        broker.start().unwrap();
        drop(writer);

        let report = broker.stop().await.unwrap();
        assert_eq!(report.cancelled + report.queue_closed, 2);
    }

    #[tokio::test]
    async fn test_stop_with_grace_times_out_on_slow_dispatch() {
        let dispatcher = Arc::new(MockDispatcher::new_sleeping(Duration::from_millis(500)));
        let (mut broker, writer) = broker(1, dispatcher);
        broker.start().unwrap();
        writer
            .send(Envelope::new("slow", None, 0, AppOpened))
            .await
            .unwrap();
        while broker.stats().in_flight == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = broker
            .stop_with_grace(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ShutdownTimeout(_)));
    }

    #[tokio::test]
    async fn test_stop_after_grace_timeout_waits_for_drain() {
        let dispatcher = Arc::new(MockDispatcher::new_sleeping(Duration::from_millis(300)));
        let (mut broker, writer) = broker(1, dispatcher.clone());
        broker.start().unwrap();
        writer
            .send(Envelope::new("slow", None, 0, AppOpened))
            .await
            .unwrap();
        while broker.stats().in_flight == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(broker.stop_with_grace(Duration::from_millis(20)).await.is_err());
        assert!(broker.is_running());
        assert_eq!(broker.consumer_states(), vec![(0, ConsumerState::Dispatching)]);

        let report = broker.stop().await.unwrap();
        assert_eq!(report.cancelled, 1);
        assert_eq!(dispatcher.call_count(), 1);
        assert_eq!(broker.stats().in_flight, 0);
        assert!(!broker.is_running());
    }

    #[tokio::test]
    async fn test_restart_after_stop_is_rejected() {
        let (mut broker, _writer) = broker(1, Arc::new(MockDispatcher::new_success()));
        broker.start().unwrap();
        broker.stop().await.unwrap();

        match broker.start() {
            Err(AppError::InvalidState(msg)) => assert!(msg.contains("already stopped")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_panic_keeps_pool_intact() {
        let dispatcher = Arc::new(MockDispatcher::new_panic_inducing("template missing"));
        let (mut broker, writer) = broker(2, dispatcher);
        broker.start().unwrap();
        for i in 0..4 {
            writer
                .send(Envelope::new(i.to_string(), None, 0, AppOpened))
                .await
                .unwrap();
        }
        while broker.stats().completed() < 4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let report = broker.stop().await.unwrap();
        assert!(report.lost.is_empty());
        assert_eq!(broker.stats().panicked, 4);
    }

    async fn crashed_consumer() -> ConsumerExit {
        panic!("consumer loop blew up")
    }

    #[tokio::test]
    async fn test_supervisor_records_lost_consumers() {
        let (_tx, token) = shutdown_channel();
        let stats = Arc::new(BrokerStats::new());
        let tasks = vec![
            (0, tokio::spawn(async { ConsumerExit::QueueClosed })),
            (1, tokio::spawn(crashed_consumer())),
        ];

        let report = supervise(tasks, token, stats.clone()).await;

        assert_eq!(report.queue_closed, 1);
        assert_eq!(report.lost, vec![1]);
        assert_eq!(stats.snapshot().consumers_lost, 1);
    }

    #[tokio::test]
    async fn test_supervisor_survives_losing_every_consumer() {
        let (_tx, token) = shutdown_channel();
        let stats = Arc::new(BrokerStats::new());
        let tasks = vec![
            (0, tokio::spawn(crashed_consumer())),
            (1, tokio::spawn(crashed_consumer())),
        ];

        let report = supervise(tasks, token, stats.clone()).await;

        assert_eq!(report.cancelled + report.queue_closed, 0);
        let mut lost = report.lost.clone();
        lost.sort_unstable();
        assert_eq!(lost, vec![0, 1]);
        assert_eq!(stats.snapshot().consumers_lost, 2);
    }
}
