pub mod catalog;
pub mod config;
pub mod error;
pub mod expansion;
pub mod fetch;
pub mod logging;
pub mod metrics;
pub mod rdf;
pub mod server;
pub mod shacl;
pub mod validator;

pub use catalog::{Catalog, GraphDescription};
pub use config::{CliArgs, ServerConfig};
pub use error::{ErrorCode, GraphRole, ValidatorError};
pub use expansion::{ExpansionEngine, ExpansionLimits};
pub use fetch::{FetchResult, GraphFetcher, HttpGraphFetcher};
pub use logging::{LoggingConfig, init_logging, shutdown_telemetry};
pub use shacl::{InferenceMode, NativeShaclEvaluator, ShaclEvaluator};
pub use validator::{GraphSource, ValidationConfig, ValidationOutcome, ValidationRequest, ValidatorService};

use anyhow::Result;

pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!(
        bind = %config.http_bind_address,
        fetch_timeout_secs = config.fetch_timeout_secs,
        fetch_max_attempts = config.fetch_max_attempts,
        cache_capacity = config.cache_capacity,
        request_timeout_secs = config.request_timeout_secs,
        "starting SHACL validation service",
    );
    server::serve(config).await
}
