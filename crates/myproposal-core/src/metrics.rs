//! `OpenTelemetry` export and the service's counters.
//!
//! This module is only compiled when the `metrics` Cargo feature is enabled.
//! It sets up the OTLP exporter for both traces and metrics and exposes the
//! counters the server records credit and delivery activity on.

use std::sync::LazyLock;

use opentelemetry::metrics::Counter;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

const METER_NAME: &str = "myproposal";

/// Errors that can occur during metrics / tracing pipeline initialisation.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to build an OTLP exporter.
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(#[from] opentelemetry_otlp::ExporterBuildError),

    /// Failed during `OTel` SDK shutdown or flush.
    #[error("OpenTelemetry SDK error: {0}")]
    Sdk(#[from] opentelemetry_sdk::error::OTelSdkError),
}

/// Keeps the `OpenTelemetry` providers alive; call [`MetricsGuard::shutdown`]
/// before exiting to flush buffered telemetry.
pub struct MetricsGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl MetricsGuard {
    pub fn shutdown(self) -> Result<(), MetricsError> {
        self.tracer_provider.shutdown()?;
        self.meter_provider.shutdown()?;
        Ok(())
    }
}

/// Initialise the OTLP pipeline for traces and metrics.
///
/// Must run before the first counter is touched; instruments created against
/// the no-op provider stay no-op.
pub fn init_metrics(endpoint: &str) -> Result<MetricsGuard, MetricsError> {
    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(trace_exporter)
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .build();

    global::set_meter_provider(meter_provider.clone());

    Ok(MetricsGuard {
        tracer_provider,
        meter_provider,
    })
}

static CREDITS_CONSUMED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    global::meter(METER_NAME)
        .u64_counter("credits.consumed")
        .with_description("Credits taken from user balances")
        .build()
});

static CREDIT_RESETS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    global::meter(METER_NAME)
        .u64_counter("credits.resets")
        .with_description("User balances refilled to their tier allotment")
        .build()
});

static DELIVERIES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    global::meter(METER_NAME)
        .u64_counter("proposals.deliveries")
        .with_description("Proposal delivery attempts by channel and outcome")
        .build()
});

pub fn record_credits_consumed(cost: u64) {
    CREDITS_CONSUMED.add(cost, &[]);
}

/// `source` is `lazy`, `cron` or `webhook`.
pub fn record_credit_resets(count: u64, source: &'static str) {
    CREDIT_RESETS.add(count, &[KeyValue::new("source", source)]);
}

pub fn record_delivery(channel: &'static str, ok: bool) {
    DELIVERIES.add(
        1,
        &[
            KeyValue::new("channel", channel),
            KeyValue::new("outcome", if ok { "ok" } else { "error" }),
        ],
    );
}
