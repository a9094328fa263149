//! Sample notifications and handlers wired by the daemon
//!
//! They only log and record in memory; real gateways plug in the same way.

use async_trait::async_trait;
use courier_core::application::{HandlerRegistry, Producer, ScopedServices};
use courier_core::domain::{Notification, TraceId};
use courier_core::port::{HandlerContext, HandlerError, NotificationHandler};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone)]
pub struct UserEnrolled {
    pub user_id: i64,
    pub phone: String,
}

impl Notification for UserEnrolled {}

#[derive(Debug, Clone)]
pub struct AppOpened {
    pub user_id: i64,
    pub platform: String,
}

impl Notification for AppOpened {}

/// Per-dispatch outbox; one per scope
#[derive(Debug, Default)]
pub struct SmsOutbox {
    messages: Mutex<Vec<(String, String)>>,
}

impl SmsOutbox {
    pub fn queue(&self, phone: &str, body: String) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((phone.to_string(), body));
    }

    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Process-wide app-usage counters (shared across scopes)
#[derive(Debug, Clone, Default)]
pub struct UsageLedger {
    opens: Arc<Mutex<HashMap<(i64, String), u64>>>,
}

impl UsageLedger {
    pub fn record(&self, user_id: i64, platform: &str) -> u64 {
        let mut opens = self
            .opens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = opens.entry((user_id, platform.to_string())).or_insert(0);
        *count += 1;
        *count
    }

    pub fn opens(&self, user_id: i64, platform: &str) -> u64 {
        self.opens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(user_id, platform.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

pub struct WelcomeSms;

#[async_trait]
impl NotificationHandler<UserEnrolled> for WelcomeSms {
    fn name(&self) -> &'static str {
        "WelcomeSms"
    }

    async fn handle(&self, n: &UserEnrolled, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        if n.phone.is_empty() {
            return Err(HandlerError::failed(format!("user {} has no phone number", n.user_id)));
        }
        let outbox = ctx.scope().require::<SmsOutbox>()?;
        outbox.queue(&n.phone, format!("Welcome aboard, user {}!", n.user_id));
        info!(user_id = n.user_id, queued = outbox.len(), "Welcome SMS queued");
        Ok(())
    }
}

pub struct RecordAppUsage {
    ledger: UsageLedger,
}

#[async_trait]
impl NotificationHandler<AppOpened> for RecordAppUsage {
    fn name(&self) -> &'static str {
        "RecordAppUsage"
    }

    async fn handle(&self, n: &AppOpened, _ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let opens = self.ledger.record(n.user_id, &n.platform);
        info!(user_id = n.user_id, platform = %n.platform, opens, "App usage recorded");
        Ok(())
    }
}

/// Typed dispatch table for the daemon
pub fn registry(ledger: UsageLedger) -> HandlerRegistry {
    HandlerRegistry::builder()
        .register(WelcomeSms)
        .register(RecordAppUsage { ledger })
        .build()
}

/// Request-scoped dependencies
pub fn scopes() -> ScopedServices {
    ScopedServices::new().add(SmsOutbox::default)
}

/// Publish a handful of sample notifications (COURIER_DEMO=1)
pub async fn publish_samples(producer: &Producer) -> courier_core::Result<()> {
    let trace = TraceId::new(format!("boot-{}", std::process::id()));
    producer
        .publish(
            Some(trace.clone()),
            UserEnrolled {
                user_id: 1,
                phone: "+15550100".to_string(),
            },
        )
        .await?;
    for platform in ["ios", "android"] {
        producer
            .publish(
                Some(trace.clone()),
                AppOpened {
                    user_id: 1,
                    platform: platform.to_string(),
                },
            )
            .await?;
    }
    Ok(())
}
