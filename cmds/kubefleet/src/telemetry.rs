//! Tracing and log output setup.

use std::io::IsTerminal;

use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "kubefleet";
const SERVICE_NAME_ENV: &str = "OTEL_SERVICE_NAME";

/// Flushes exported spans when dropped. Hold it until the command returns.
pub struct TelemetryGuard {
	_inner: Option<OtelGuard>,
}

struct OtelGuard {
	tracer_provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
	fn drop(&mut self) {
		if let Err(err) = self.tracer_provider.shutdown() {
			eprintln!("flushing traces: {err}");
		}
	}
}

/// Map a `--log-level` value to a tracing level.
///
/// `disabled` and `fatal` have no tracing equivalent; both collapse to
/// `error`. Unknown values yield `None` so that `RUST_LOG` decides.
pub fn parse_level(value: &str) -> Option<Level> {
	match value.to_ascii_lowercase().as_str() {
		"trace" => Some(Level::TRACE),
		"debug" => Some(Level::DEBUG),
		"info" => Some(Level::INFO),
		"warn" | "warning" => Some(Level::WARN),
		"error" | "fatal" | "disabled" => Some(Level::ERROR),
		_ => None,
	}
}

fn otel_export_enabled() -> bool {
	std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_ENDPOINT).is_ok()
		|| std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_TRACES_ENDPOINT).is_ok()
}

fn filter(log_level: Option<Level>) -> EnvFilter {
	match log_level {
		Some(level) => EnvFilter::new(level.as_str()),
		None => EnvFilter::builder()
			.with_default_directive(Level::INFO.into())
			.from_env_lossy(),
	}
}

/// Human-readable logs on a terminal, one JSON object per line otherwise.
fn stderr_layer<S>() -> Box<dyn Layer<S> + Send + Sync>
where
	S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span> + 'static,
{
	let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
	if std::io::stderr().is_terminal() {
		layer.pretty().boxed()
	} else {
		layer.json().boxed()
	}
}

/// Install the global subscriber.
///
/// The level comes from `--log-level` when given, then `RUST_LOG`, then
/// defaults to info. Logs always go to stderr; stdout carries reports only.
///
/// OpenTelemetry export is enabled when `OTEL_EXPORTER_OTLP_ENDPOINT` or
/// `OTEL_EXPORTER_OTLP_TRACES_ENDPOINT` is set. The service name defaults to
/// `kubefleet` unless `OTEL_SERVICE_NAME` overrides it.
pub fn init(log_level: Option<Level>) -> Result<TelemetryGuard> {
	let (otel_layer, guard) = if otel_export_enabled() {
		let (layer, guard) = init_otel()?;
		(Some(layer), Some(guard))
	} else {
		(None, None)
	};

	tracing_subscriber::registry()
		.with(filter(log_level))
		.with(stderr_layer())
		.with(otel_layer)
		.init();

	Ok(TelemetryGuard { _inner: guard })
}

fn init_otel<S>() -> Result<(impl Layer<S>, OtelGuard)>
where
	S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
	use opentelemetry_sdk::Resource;

	// Resource::builder() reads OTEL_SERVICE_NAME and OTEL_RESOURCE_ATTRIBUTES itself.
	let resource = match std::env::var(SERVICE_NAME_ENV) {
		Ok(_) => Resource::builder().build(),
		Err(_) => Resource::builder().with_service_name(SERVICE_NAME).build(),
	};

	let protocol = std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL)
		.unwrap_or_else(|_| opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL_DEFAULT.to_string());

	let exporter = if protocol == "grpc" {
		opentelemetry_otlp::SpanExporter::builder().with_tonic().build()?
	} else {
		opentelemetry_otlp::SpanExporter::builder().with_http().build()?
	};

	let tracer_provider = SdkTracerProvider::builder()
		.with_resource(resource)
		.with_batch_exporter(exporter)
		.build();

	let layer = tracing_opentelemetry::layer()
		.with_error_records_to_exceptions(true)
		.with_tracer(tracer_provider.tracer(SERVICE_NAME));

	opentelemetry::global::set_tracer_provider(tracer_provider.clone());

	Ok((layer, OtelGuard { tracer_provider }))
}
