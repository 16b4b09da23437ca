//! # Telemetry Features
//!
//! Console logging is always on. OpenTelemetry export of spans and metrics is
//! opt-in through cargo features.
//!
//! ## Feature matrix
//!
//! - `tracing`: Enables OpenTelemetry distributed tracing (via spans).
//! - `metrics`: Enables OpenTelemetry metrics (via counters, histograms, etc.).
//! - `otlp`: Enables the OTLP/gRPC exporter.
//! - `stdout`: Enables the stdout exporter.
//!
//! Exporters require at least one of `tracing` or `metrics`. Both exporters
//! can be enabled at the same time.
//!
//! ## OTLP settings
//!
//! - `OTLP_ENDPOINT` (required): collector URL.
//! - `OTLP_COMPRESSION` (default `gzip`): `gzip` or `zstd`.
//! - `OTLP_HEADERS` (optional): `key=value` pairs separated by commas, sent
//!   as request metadata (API keys, dataset names).
//!
//! ## Metrics
//!
//! - `calls` (by `method`): accepted calls.
//! - `calls_inflight`: calls currently running.
//! - `call_errors` (by `method` and `code`): calls that ended with an error
//!   status.
//! - `call_duration` (ms, by `method`): accept to terminal status.
//! - `units_sent` (by `method`): streamed response units.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --features tracing,metrics,stdout
//! OTLP_ENDPOINT=https://collector:4317 cargo run --features tracing,otlp
//! ```

#[cfg(all(feature = "otlp", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!("The 'otlp' feature requires at least one of 'tracing' or 'metrics' to be enabled.");

#[cfg(all(feature = "stdout", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'tracing' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "tracing")))]
use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
#[cfg(all(feature = "otlp", feature = "metrics"))]
use opentelemetry_sdk::metrics::Temporality;
#[cfg(feature = "otlp")]
use tonic::metadata::MetadataMap;
#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "tracing")))]
use tonic::transport::ClientTlsConfig;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

const SERVICE_NAME: &str = "rivulet";

pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every exporter. Errors are reported on stderr
    /// because the subscriber may already be gone.
    pub fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "tracing")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "tracing")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Human-readable console output, independent of the stdout exporter.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(&meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(feature = "otlp")]
struct OtlpSettings {
    endpoint: String,
    compression: Compression,
    metadata: MetadataMap,
}

#[cfg(feature = "otlp")]
impl OtlpSettings {
    fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        use core::str::FromStr;

        let endpoint = std::env::var("OTLP_ENDPOINT").context("missing `OTLP_ENDPOINT`")?;
        let compression = std::env::var("OTLP_COMPRESSION")
            .unwrap_or_else(|_| "gzip".to_string())
            .to_ascii_lowercase();
        let compression = Compression::from_str(&compression)?;

        let mut metadata = MetadataMap::new();
        if let Ok(headers) = std::env::var("OTLP_HEADERS") {
            for pair in headers.split(',').filter(|pair| !pair.trim().is_empty()) {
                let (name, value) = pair
                    .split_once('=')
                    .with_context(|| format!("invalid `OTLP_HEADERS` entry: {pair}"))?;
                let key = tonic::metadata::MetadataKey::from_bytes(name.trim().as_bytes())
                    .with_context(|| format!("invalid header name: {name}"))?;
                let value = value
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid value for header {name}"))?;
                metadata.insert(key, value);
            }
        }

        Ok(Self {
            endpoint,
            compression,
            metadata,
        })
    }
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let settings = OtlpSettings::from_env()?;
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(settings.metadata)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(settings.compression)
            .with_endpoint(settings.endpoint)
            .with_protocol(Protocol::Grpc)
            .with_temporality(Temporality::Delta)
            .build()
            .context("failed to build metrics exporter")?;

        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

/// Spans are exported in batches every 5 seconds.
#[cfg(all(feature = "tracing", any(feature = "stdout", feature = "otlp")))]
fn batched<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: sdktrace::SpanExporter + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(std::time::Duration::from_secs(5))
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}

#[cfg(feature = "tracing")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        builder.with_span_processor(batched(SpanExporter::default()))
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let settings = OtlpSettings::from_env()?;
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(settings.metadata)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(settings.compression)
            .with_endpoint(settings.endpoint)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build tracer exporter")?;

        builder.with_span_processor(batched(exporter))
    };

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
static CALLS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CALLS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CALL_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CALL_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static UNITS_SENT: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: &Meter) {
    let _ = CALLS.set(
        meter
            .u64_counter("calls")
            .with_description("Accepted calls")
            .build(),
    );

    let _ = CALLS_INFLIGHT.set(
        meter
            .i64_up_down_counter("calls_inflight")
            .with_description("Calls currently running")
            .build(),
    );

    let _ = CALL_ERRORS.set(
        meter
            .u64_counter("call_errors")
            .with_description("Calls ended with an error status")
            .build(),
    );

    let _ = CALL_DURATION_MS.set(
        meter
            .f64_histogram("call_duration")
            .with_unit("ms")
            .with_description("Accept to terminal status")
            .build(),
    );

    let _ = UNITS_SENT.set(
        meter
            .u64_counter("units_sent")
            .with_description("Streamed response units")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_calls(method: &'static str) {
    if let Some(counter) = CALLS.get() {
        counter.add(1, &[KeyValue::new("method", method)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_calls(_method: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_calls_inflight() {
    if let Some(counter) = CALLS_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_calls_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_calls_inflight() {
    if let Some(counter) = CALLS_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_calls_inflight() {}

#[cfg(feature = "metrics")]
pub fn increment_call_errors(method: &'static str, code: rivulet::Code) {
    if let Some(counter) = CALL_ERRORS.get() {
        counter.add(
            1,
            &[
                KeyValue::new("method", method),
                KeyValue::new("code", code.to_string()),
            ],
        );
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_call_errors(_method: &'static str, _code: rivulet::Code) {}

#[cfg(feature = "metrics")]
pub fn record_call_duration(method: &'static str, duration_ms: f64) {
    if let Some(histogram) = CALL_DURATION_MS.get() {
        histogram.record(duration_ms, &[KeyValue::new("method", method)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_call_duration(_method: &'static str, _duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn increment_units_sent(method: &'static str) {
    if let Some(counter) = UNITS_SENT.get() {
        counter.add(1, &[KeyValue::new("method", method)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_units_sent(_method: &'static str) {}
