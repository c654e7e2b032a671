//! Tracing subscriber initialization for orchestrator and worker processes.
//!
//! Workers usually want machine-readable output (`LogFormat::Json`), local
//! development wants the human `fmt` layer. OpenTelemetry export is opt-in
//! and uses the stdout exporter here; swap it for OTLP when wiring a real
//! collector.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use std::sync::OnceLock;

/// Keeps the OTel provider alive so it can be flushed on shutdown.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Output format for the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output for local development.
    Pretty,
    /// Newline-delimited JSON for worker fleets and log shippers.
    Json,
}

/// Install the global tracing subscriber.
///
/// Respects `RUST_LOG` via `EnvFilter`. When `enable_otel` is set, tracing
/// spans additionally bridge into OpenTelemetry.
///
/// # Errors
///
/// Returns an error when a global subscriber is already installed.
pub fn init_tracing(
    format: LogFormat,
    enable_otel: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env();

    let otel_layer = enable_otel.then(|| {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("flowline");
        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);
        tracing_opentelemetry::layer().with_tracer(tracer)
    });

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?,
    }

    Ok(())
}

/// Flush pending spans and shut the OTel provider down. Safe to call when
/// OTel was never enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(err) = provider.shutdown()
    {
        eprintln!("warning: OTel tracer provider shutdown error: {err}");
    }
}
