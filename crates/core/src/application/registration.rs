// Registration - composition of queue, consumer pool, broker and producer

use crate::application::broker::{Broker, Consumer};
use crate::application::config::MessagingConfig;
use crate::application::producer::Producer;
use crate::application::queue::message_queue;
use crate::application::scope::ScopedServices;
use crate::application::stats::BrokerStats;
use crate::error::{AppError, Result};
use crate::port::id_provider::UuidProvider;
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{Dispatcher, IdProvider, ScopeProvider, TimeProvider};
use std::sync::Arc;
use tracing::info;

/// What the composition root hands out: the injectable producer and the
/// broker to be started at boot and stopped at shutdown.
pub struct Messaging {
    pub producer: Producer,
    pub broker: Broker,
}

/// Wire the subsystem with production id/time providers
pub fn register(
    config: &MessagingConfig,
    dispatcher: Arc<dyn Dispatcher>,
    scopes: Arc<dyn ScopeProvider>,
) -> Result<Messaging> {
    MessagingBuilder::new(config.clone())
        .dispatcher(dispatcher)
        .scopes(scopes)
        .build()
}

/// Step-by-step wiring (tests swap in deterministic providers)
pub struct MessagingBuilder {
    config: MessagingConfig,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    scopes: Arc<dyn ScopeProvider>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl MessagingBuilder {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            config,
            dispatcher: None,
            scopes: Arc::new(ScopedServices::new()),
            id_provider: Arc::new(UuidProvider),
            time_provider: Arc::new(SystemTimeProvider),
        }
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn scopes(mut self, scopes: Arc<dyn ScopeProvider>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn id_provider(mut self, id_provider: Arc<dyn IdProvider>) -> Self {
        self.id_provider = id_provider;
        self
    }

    pub fn time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn build(self) -> Result<Messaging> {
        self.config.validate()?;
        let dispatcher = self
            .dispatcher
            .ok_or_else(|| AppError::Config("no dispatcher registered".to_string()))?;

        let stats = Arc::new(BrokerStats::new());
        let (writer, reader) = message_queue(self.config.capacity());

        let consumers = (0..self.config.consumer_count)
            .map(|id| {
                Consumer::new(
                    id,
                    reader.clone(),
                    Arc::clone(&dispatcher),
                    Arc::clone(&self.scopes),
                    Arc::clone(&stats),
                )
            })
            .collect();

        let producer = Producer::new(
            writer,
            self.config.overflow,
            self.id_provider,
            self.time_provider,
            Arc::clone(&stats),
        );
        let broker = Broker::new(consumers, stats, self.config.shutdown_grace());

        info!(
            consumers = self.config.consumer_count,
            capacity = ?self.config.capacity(),
            overflow = ?self.config.overflow,
            "Messaging registered"
        );

        Ok(Messaging { producer, broker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::dispatcher::mocks::MockDispatcher;

    #[tokio::test]
    async fn test_register_builds_pool_of_configured_size() {
        let messaging = register(
            &MessagingConfig::with_consumers(6),
            Arc::new(MockDispatcher::new_success()),
            Arc::new(ScopedServices::new()),
        )
        .unwrap();

        assert_eq!(messaging.broker.consumer_count(), 6);
        assert!(!messaging.broker.is_running());
    }

    #[test]
    fn test_build_requires_dispatcher() {
        let err = MessagingBuilder::new(MessagingConfig::default())
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("dispatcher"));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = MessagingBuilder::new(MessagingConfig::with_consumers(0))
            .dispatcher(Arc::new(MockDispatcher::new_success()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}
