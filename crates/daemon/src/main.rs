//! Courier - Main Entry Point
//! Hosts the notification broker for the lifetime of the process

mod handlers;
mod signals;
mod telemetry;

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use courier_core::application::{register, Messaging, MessagingConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const ENV_LOG_FORMAT: &str = "COURIER_LOG_FORMAT";
const ENV_LOG_DIR: &str = "COURIER_LOG_DIR";
const ENV_DEMO: &str = "COURIER_DEMO";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (guard flushes the file writer on exit)
    let _log_guard = init_logging()?;

    info!("Courier v{} starting...", VERSION);
    if telemetry::endpoint_configured() && !cfg!(feature = "telemetry") {
        warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
        warn!("Rebuild with: cargo build --features telemetry");
    }

    // 2. Load configuration
    let config = MessagingConfig::from_env()?;
    info!(
        consumers = config.consumer_count,
        queue_capacity = ?config.queue_capacity,
        overflow = ?config.overflow,
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let ledger = handlers::UsageLedger::default();
    let registry = handlers::registry(ledger);
    info!(message_types = ?registry.message_types(), "Handlers registered");
    let Messaging {
        producer,
        mut broker,
    } = register(
        &config,
        Arc::new(registry),
        Arc::new(handlers::scopes()),
    )?;

    // 4. Start the consumer pool
    broker.start()?;

    if std::env::var(ENV_DEMO).is_ok_and(|v| v == "1") {
        handlers::publish_samples(&producer).await?;
    }

    info!("System ready. Waiting for notifications...");
    info!("Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal
    signals::wait_for_shutdown_signal().await?;

    info!("Shutdown signal received. Draining in-flight notifications...");

    // 6. Graceful shutdown
    drop(producer);
    match broker.shutdown().await {
        Ok(report) if !report.lost.is_empty() => {
            warn!(lost = ?report.lost, "Some consumers had died before shutdown")
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Broker did not stop cleanly"),
    }

    let stats = broker.stats();
    info!(
        enqueued = stats.enqueued,
        dispatched = stats.dispatched,
        failed = stats.failed,
        panicked = stats.panicked,
        unhandled = stats.unhandled,
        "Shutdown complete."
    );

    Ok(())
}

/// Pretty or JSON output (COURIER_LOG_FORMAT), to stdout or a daily file (COURIER_LOG_DIR)
fn init_logging() -> Result<Option<WorkerGuard>> {
    let log_format = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| "pretty".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("courier=info"))?;

    let (writer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "courier.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        Err(_) => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let fmt_layer = match log_format.as_str() {
        // Production: JSON structured logging
        "json" => fmt::layer().json().with_writer(writer).boxed(),
        // Development: Pretty formatting with colors
        _ => fmt::layer().pretty().with_writer(writer).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(telemetry::layer()?)
        .with(fmt_layer)
        .init();

    Ok(guard)
}
