// Application Layer - Broker use cases

pub mod broker;
pub mod config;
pub mod producer;
pub mod queue;
pub mod registration;
pub mod registry;
pub mod scope;
pub mod stats;

// Re-exports
pub use broker::{
    shutdown_channel, Broker, BrokerReport, ConsumerId, ConsumerState, DispatchOutcome,
    ShutdownSender, ShutdownToken,
};
pub use config::{MessagingConfig, OverflowPolicy};
pub use producer::Producer;
pub use queue::{EnqueueError, QueueCapacity};
pub use registration::{register, Messaging, MessagingBuilder};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
pub use scope::ScopedServices;
pub use stats::{BrokerStats, StatsSnapshot};
