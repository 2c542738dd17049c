//! Structured logging setup.
//!
//! Pretty output for development, JSON for production, written through a
//! non-blocking appender to stdout, stderr or a daily-rolling file. When an
//! OTLP endpoint is configured, spans are exported with OpenTelemetry too.

use anyhow::{Context, Result};
use opentelemetry::{KeyValue, trace::TraceError};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, Tracer},
};
use std::env;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub output: LogOutput,
    /// Directory for log files when `output` is `file`
    pub log_dir: PathBuf,
    pub log_file_prefix: String,
    pub service_name: String,
    pub service_version: String,
    /// "development", "staging", "production", ...
    pub environment: String,
    /// OTLP collector; tracing export is off when unset
    pub otlp_endpoint: Option<String>,
    /// Trace sampling ratio (0.0 to 1.0)
    pub otel_sampling_rate: f64,
    pub otlp_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily-rolling file under `log_dir`
    File,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_environment(
            env::var("ENVIRONMENT")
                .or_else(|_| env::var("ENV"))
                .unwrap_or_else(|_| "development".to_string()),
        )
    }
}

impl LoggingConfig {
    fn for_environment(environment: String) -> Self {
        let production = is_production(&environment);
        Self {
            format: if production {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            output: LogOutput::Stderr,
            log_dir: PathBuf::from("logs"),
            log_file_prefix: SERVICE_NAME.to_string(),
            service_name: SERVICE_NAME.to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment,
            otlp_endpoint: None,
            otel_sampling_rate: if production { 0.1 } else { 1.0 },
            otlp_timeout_secs: 10,
        }
    }

    /// Reads `LOG_FORMAT`, `LOG_OUTPUT`, `LOG_DIR`, `ENVIRONMENT` and the OTLP
    /// variables. Unparsable values keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(format) = env_parse::<LogFormat>("LOG_FORMAT") {
            config.format = format;
        }
        if let Some(output) = env_parse::<LogOutput>("LOG_OUTPUT") {
            config.output = output;
        }
        if let Ok(log_dir) = env::var("LOG_DIR") {
            config.log_dir = PathBuf::from(log_dir);
        }

        config.otlp_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .or_else(|_| env::var("OTLP_ENDPOINT"))
            .ok()
            .filter(|endpoint| !endpoint.trim().is_empty());

        if let Some(rate) = env_parse::<f64>("OTEL_SAMPLING_RATE") {
            config.otel_sampling_rate = rate.clamp(0.0, 1.0);
        }
        if let Some(timeout) = env_parse::<u64>("OTEL_EXPORTER_OTLP_TIMEOUT") {
            config.otlp_timeout_secs = timeout;
        }

        config
    }

    fn resource(&self) -> Resource {
        Resource::new(vec![
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                self.service_name.clone(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                self.service_version.clone(),
            ),
            KeyValue::new("environment", self.environment.clone()),
        ])
    }

    fn sampler(&self) -> Sampler {
        if self.otel_sampling_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.otel_sampling_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                self.otel_sampling_rate,
            )))
        }
    }

    fn default_filter(&self) -> String {
        let level = if is_production(&self.environment) {
            "info"
        } else {
            "debug"
        };
        format!("{level},hyper=info,reqwest=info,tower=info")
    }
}

fn is_production(environment: &str) -> bool {
    matches!(environment, "production" | "prod")
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

/// Installs the global subscriber.
///
/// The returned guard flushes buffered log lines when dropped and must be
/// kept alive for the lifetime of the process.
pub fn init_logging(config: LoggingConfig) -> Result<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter()));

    let (writer, guard) = match config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
        LogOutput::File => {
            std::fs::create_dir_all(&config.log_dir).with_context(|| {
                format!("failed to create log directory {:?}", config.log_dir)
            })?;
            let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
            tracing_appender::non_blocking(appender)
        }
    };

    let otel_layer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => match init_tracer(&config, endpoint) {
            Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Err(e) => {
                eprintln!(
                    "Warning: failed to initialize OpenTelemetry exporter: {e}. Continuing without distributed tracing."
                );
                None
            }
        },
        None => None,
    };

    let registry = tracing_subscriber::registry().with(otel_layer);

    match config.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(env_filter);
            registry
                .with(fmt_layer)
                .try_init()
                .context("a global tracing subscriber is already installed")?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_writer(writer)
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .with_ansi(true)
                .with_filter(env_filter);
            registry
                .with(fmt_layer)
                .try_init()
                .context("a global tracing subscriber is already installed")?;
        }
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        format = %config.format,
        output = %config.output,
        otlp = config.otlp_endpoint.is_some(),
        "logging initialized"
    );

    Ok(guard)
}

/// Installs the batch OTLP pipeline as the global provider and returns its tracer.
fn init_tracer(config: &LoggingConfig, endpoint: &str) -> Result<Tracer, TraceError> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(config.otlp_timeout_secs));

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(config.sampler())
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(config.resource()),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)
}

/// Flushes pending spans to the OTLP collector.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
