//! Tracing subscriber and OpenTelemetry setup.
//!
//! Always logs to stderr through a fmt layer. When an OTLP endpoint is
//! configured, traces, metrics, and logs are exported there as well.

pub mod dispatch;
pub mod metrics;

use crate::error::{Error, Result};

/// Configuration for telemetry initialization.
pub struct TelemetryConfig {
    /// Optional OTLP endpoint (e.g. "http://localhost:4317").
    pub endpoint: Option<String>,
    /// The service name reported in telemetry signals.
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info").
    pub log_level: String,
}

/// OTel providers installed for an OTLP endpoint.
struct Providers {
    tracer: opentelemetry_sdk::trace::SdkTracerProvider,
    meter: opentelemetry_sdk::metrics::SdkMeterProvider,
    logger: opentelemetry_sdk::logs::SdkLoggerProvider,
}

/// Guard that shuts down OTel providers on drop.
///
/// Hold it for the lifetime of the process.
pub struct TelemetryGuard {
    providers: Option<Providers>,
}

impl TelemetryGuard {
    /// Force-flush every pipeline. No-op without an OTLP endpoint.
    pub fn force_flush(&self) {
        if let Some(ref p) = self.providers {
            let _ = p.tracer.force_flush();
            let _ = p.meter.force_flush();
            let _ = p.logger.force_flush();
        }
    }

    /// Whether OTLP export is active.
    pub fn exporting(&self) -> bool {
        self.providers.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(p) = self.providers.take() {
            let _ = p.logger.shutdown();
            let _ = p.meter.shutdown();
            let _ = p.tracer.shutdown();
        }
    }
}

fn build_providers(endpoint: &str, service_name: String) -> Result<Providers> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig as _;
    use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(service_name)
        .with_attribute(KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")))
        .build();

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("failed to create OTLP span exporter: {e}")))?;
    let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("failed to create OTLP metric exporter: {e}")))?;
    let meter = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .with_resource(resource.clone())
        .build();

    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("failed to create OTLP log exporter: {e}")))?;
    let logger = opentelemetry_sdk::logs::SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(resource)
        .build();

    Ok(Providers {
        tracer,
        meter,
        logger,
    })
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Fails if an OTLP exporter cannot be built or a global subscriber is
/// already set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(endpoint) = config.endpoint else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;
        return Ok(TelemetryGuard { providers: None });
    };

    let providers = build_providers(&endpoint, config.service_name)?;
    opentelemetry::global::set_meter_provider(providers.meter.clone());

    let otel_trace_layer =
        tracing_opentelemetry::layer().with_tracer(providers.tracer.tracer("tracker-dispatch"));
    let otel_log_layer = opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(
        &providers.logger,
    );

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(otel_trace_layer)
        .with(otel_log_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    Ok(TelemetryGuard {
        providers: Some(providers),
    })
}
