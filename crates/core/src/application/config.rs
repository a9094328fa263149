// Messaging Configuration
// Every knob is passed explicitly; there is no process-wide state

use crate::application::broker::constants::*;
use crate::application::queue::QueueCapacity;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_CONSUMERS: &str = "COURIER_CONSUMERS";
pub const ENV_QUEUE_CAPACITY: &str = "COURIER_QUEUE_CAPACITY";
pub const ENV_OVERFLOW: &str = "COURIER_OVERFLOW";
pub const ENV_SHUTDOWN_GRACE_MS: &str = "COURIER_SHUTDOWN_GRACE_MS";

/// What a producer does when the bounded queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Block until a consumer frees a slot
    Wait,
    /// Block at most `timeout_ms`, then fail with a timeout
    WaitFor { timeout_ms: u64 },
    /// Fail immediately
    Reject,
}

impl OverflowPolicy {
    /// Parse `wait`, `reject` or `wait:<ms>`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "wait" => Ok(OverflowPolicy::Wait),
            "reject" => Ok(OverflowPolicy::Reject),
            _ => match s.strip_prefix("wait:") {
                Some(ms) => ms
                    .parse()
                    .map(|timeout_ms| OverflowPolicy::WaitFor { timeout_ms })
                    .map_err(|_| AppError::Config(format!("invalid overflow timeout: {}", ms))),
                None => Err(AppError::Config(format!(
                    "unknown overflow policy '{}' (expected wait, reject or wait:<ms>)",
                    s
                ))),
            },
        }
    }
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::WaitFor {
            timeout_ms: DEFAULT_ENQUEUE_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Broker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Size of the consumer pool (N)
    pub consumer_count: usize,
    /// `None` = unbounded
    pub queue_capacity: Option<usize>,
    pub overflow: OverflowPolicy,
    pub shutdown_grace_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            consumer_count: DEFAULT_CONSUMER_COUNT,
            queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
            overflow: OverflowPolicy::default(),
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
        }
    }
}

impl MessagingConfig {
    /// Config with N consumers and defaults for the rest
    pub fn with_consumers(consumer_count: usize) -> Self {
        Self {
            consumer_count,
            ..Default::default()
        }
    }

    /// Read `COURIER_*` environment variables, defaulting what is unset
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable lookup (tests)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_CONSUMERS) {
            config.consumer_count = parse_number(ENV_CONSUMERS, &value)?;
        }
        if let Some(value) = lookup(ENV_QUEUE_CAPACITY) {
            config.queue_capacity = match value.trim() {
                "0" | "unbounded" => None,
                other => Some(parse_number(ENV_QUEUE_CAPACITY, other)?),
            };
        }
        if let Some(value) = lookup(ENV_OVERFLOW) {
            config.overflow = OverflowPolicy::parse(&value)?;
        }
        if let Some(value) = lookup(ENV_SHUTDOWN_GRACE_MS) {
            config.shutdown_grace_ms = parse_number(ENV_SHUTDOWN_GRACE_MS, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.consumer_count == 0 {
            return Err(AppError::Config("consumer_count must be at least 1".to_string()));
        }
        if self.consumer_count > MAX_CONSUMER_COUNT {
            return Err(AppError::Config(format!(
                "consumer_count must be at most {}",
                MAX_CONSUMER_COUNT
            )));
        }
        if self.queue_capacity == Some(0) {
            return Err(AppError::Config(
                "queue_capacity must be at least 1 (omit it for an unbounded queue)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn capacity(&self) -> QueueCapacity {
        match self.queue_capacity {
            Some(size) => QueueCapacity::Bounded(size),
            None => QueueCapacity::Unbounded,
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} must be a number, got '{}'", key, value)))
}
