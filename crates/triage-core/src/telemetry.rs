use std::fmt as StdFmt;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::Utc;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::{TraceContextExt, TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchSpanProcessor, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use serde_json::json;
use thiserror::Error;
use tracing::Subscriber;
use tracing_opentelemetry::{OpenTelemetrySpanExt, OtelData};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::{self, FmtContext};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{AppConfig, TelemetryConfig};

static SUBSCRIBER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Owns the tracer provider so buffered spans are flushed when the report exits.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            let _ = provider.shutdown();
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to set tracing subscriber: {0}")]
    SubscriberInit(String),
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(String),
}

/// Install the global subscriber: RUST_LOG filtering (default `info`), pretty
/// output in `dev` and JSON lines elsewhere, plus OTLP span export when
/// configured. Only the first call installs anything.
pub fn init_telemetry(
    app: &AppConfig,
    telemetry: &TelemetryConfig,
) -> Result<TelemetryGuard, TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(TelemetryGuard { provider: None });
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| TelemetryError::SubscriberInit(err.to_string()))?;

    let provider = build_provider(app, telemetry)?;
    let tracer = provider
        .as_ref()
        .map(|provider| provider.tracer(app.service_name.clone()));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if app.env.eq_ignore_ascii_case("dev")
    {
        fmt::layer()
            .with_target(true)
            .pretty()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .event_format(JsonLineFormatter::new(&app.service_name))
            .with_writer(std::io::stderr)
            .boxed()
    };

    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer)))
        .with(env_filter);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| TelemetryError::SubscriberInit(err.to_string()))?;
    let _ = SUBSCRIBER_INSTALLED.set(());

    Ok(TelemetryGuard { provider })
}

fn build_provider(
    app: &AppConfig,
    telemetry: &TelemetryConfig,
) -> Result<Option<SdkTracerProvider>, TelemetryError> {
    if !telemetry.export_traces {
        return Ok(None);
    }

    let endpoint = match telemetry.otlp_endpoint.as_deref() {
        Some(endpoint) if !endpoint.is_empty() => endpoint,
        _ => return Ok(None),
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_timeout(Duration::from_secs(3))
        .with_endpoint(endpoint)
        .build()
        .map_err(|err| TelemetryError::ExporterBuild(err.to_string()))?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", app.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", app.env.clone()),
        ])
        .build();
    let provider = SdkTracerProvider::builder()
        .with_span_processor(BatchSpanProcessor::builder(exporter).build())
        .with_resource(resource)
        .build();

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(opentelemetry_sdk::propagation::TraceContextPropagator::new());

    Ok(Some(provider))
}

/// Logging without a config file, for tests and early startup.
pub fn init_logging(env: &str) -> Result<(), TelemetryError> {
    let app = AppConfig {
        service_name: "triage".to_string(),
        env: env.to_string(),
    };
    let telemetry = TelemetryConfig {
        otlp_endpoint: None,
        export_traces: false,
    };
    init_telemetry(&app, &telemetry).map(|_guard| ())
}

/// One JSON object per event, carrying the active span and its trace id.
struct JsonLineFormatter {
    service: String,
}

impl JsonLineFormatter {
    fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for JsonLineFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> StdFmt::Result {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let current = ctx.lookup_current();
        let trace_id = current
            .as_ref()
            .and_then(|span| {
                span.extensions()
                    .get::<OtelData>()
                    .and_then(|data| data.trace_id())
            })
            .or_else(|| {
                let otel_ctx = tracing::Span::current().context();
                let span_ctx = otel_ctx.span().span_context().clone();
                span_ctx.is_valid().then(|| span_ctx.trace_id())
            })
            .map(|id| id.to_string());

        let payload = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "service": self.service,
            "level": event.metadata().level().as_str().to_lowercase(),
            "target": event.metadata().target(),
            "span": current.map(|span| span.name().to_string()),
            "trace_id": trace_id,
            "fields": visitor.fields,
        });

        let serialized = serde_json::to_string(&payload).map_err(|_| StdFmt::Error)?;
        writer.write_str(&serialized)?;
        writer.write_str("\n")
    }
}

#[derive(Default)]
struct JsonVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl tracing_subscriber::field::Visit for JsonVisitor {
    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), value.to_string().into());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn StdFmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{value:?}").into());
    }
}
