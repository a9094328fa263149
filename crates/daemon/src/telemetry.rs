//! Telemetry setup for OpenTelemetry integration

use anyhow::Result;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const ENV_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
const DEFAULT_SERVICE_NAME: &str = "courier";

/// True when an OTLP endpoint is configured
pub fn endpoint_configured() -> bool {
    std::env::var(ENV_OTLP_ENDPOINT).is_ok()
}

/// Build the OpenTelemetry layer if enabled
///
/// # Environment Variables
///
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
/// - `OTEL_SERVICE_NAME`: Service name (default: courier)
///
/// # Example
///
/// ```text
/// OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
/// OTEL_SERVICE_NAME=courier-dev \
///     ./courier
/// ```
///
/// Returns `None` when no endpoint is set or the `telemetry` feature is off.
pub fn layer<S>() -> Result<Option<Box<dyn Layer<S> + Send + Sync>>>
where
    S: Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    if !endpoint_configured() {
        return Ok(None);
    }

    #[cfg(feature = "telemetry")]
    {
        otel_layer().map(Some)
    }

    #[cfg(not(feature = "telemetry"))]
    {
        Ok(None)
    }
}

#[cfg(feature = "telemetry")]
fn otel_layer<S>() -> Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::TracerProvider;

    let service_name =
        std::env::var(ENV_SERVICE_NAME).unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());
    let endpoint = std::env::var(ENV_OTLP_ENDPOINT)?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .build();
    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}
