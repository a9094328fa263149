//! Shared fixtures: a probe-instrumented handler and broker wiring

#![allow(dead_code)]

use async_trait::async_trait;
use courier_core::application::{HandlerRegistry, Messaging, MessagingBuilder, MessagingConfig};
use courier_core::domain::Notification;
use courier_core::port::id_provider::SequentialIdProvider;
use courier_core::port::{HandlerContext, HandlerError, NotificationHandler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Test notification; the fields steer what the handler does with it
#[derive(Debug, Clone)]
pub struct Work {
    pub n: usize,
    pub delay: Duration,
    pub fail: bool,
    pub panic: bool,
}

impl Notification for Work {}

impl Work {
    pub fn quick(n: usize) -> Self {
        Self {
            n,
            delay: Duration::ZERO,
            fail: false,
            panic: false,
        }
    }

    pub fn slow(n: usize, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::quick(n)
        }
    }

    pub fn failing(n: usize) -> Self {
        Self {
            fail: true,
            ..Self::quick(n)
        }
    }

    pub fn panicking(n: usize) -> Self {
        Self {
            panic: true,
            ..Self::quick(n)
        }
    }
}

/// Observations made by `WorkHandler`
#[derive(Default)]
pub struct Probe {
    handled: Mutex<Vec<usize>>,
    traces: Mutex<Vec<Option<String>>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Message numbers in completion order
    pub fn handled(&self) -> Vec<usize> {
        self.handled.lock().unwrap().clone()
    }

    pub fn handled_sorted(&self) -> Vec<usize> {
        let mut handled = self.handled();
        handled.sort_unstable();
        handled
    }

    pub fn handled_count(&self) -> usize {
        self.handled.lock().unwrap().len()
    }

    pub fn traces(&self) -> Vec<Option<String>> {
        self.traces.lock().unwrap().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct WorkHandler {
    pub probe: Arc<Probe>,
}

#[async_trait]
impl NotificationHandler<Work> for WorkHandler {
    async fn handle(&self, work: &Work, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.peak.fetch_max(now, Ordering::SeqCst);
        self.probe
            .traces
            .lock()
            .unwrap()
            .push(ctx.trace_id().map(|t| t.to_string()));

        if work.panic {
            self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
            panic!("work {} panicked", work.n);
        }

        if !work.delay.is_zero() {
            tokio::time::sleep(work.delay).await;
        }
        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);

        if work.fail {
            return Err(HandlerError::failed(format!("work {} failed", work.n)));
        }
        self.probe.handled.lock().unwrap().push(work.n);
        Ok(())
    }
}

/// Broker + producer whose only handler is `WorkHandler`
pub fn messaging(config: MessagingConfig, probe: &Arc<Probe>) -> Messaging {
    let registry = HandlerRegistry::builder()
        .register(WorkHandler {
            probe: Arc::clone(probe),
        })
        .build();

    MessagingBuilder::new(config)
        .dispatcher(Arc::new(registry))
        .id_provider(Arc::new(SequentialIdProvider::new()))
        .build()
        .expect("valid test config")
}

/// Poll `condition` every millisecond until it holds (panics after `limit`)
pub async fn wait_until(limit: Duration, condition: impl Fn() -> bool) {
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
