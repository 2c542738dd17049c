//! HTTP surface around the validator.

pub mod routes;

use crate::catalog::Catalog;
use crate::config::ServerConfig;
use crate::error::ValidatorError;
use crate::expansion::ExpansionEngine;
use crate::fetch::{GraphCache, GraphFetcher, HttpGraphFetcher};
use crate::shacl::NativeShaclEvaluator;
use crate::validator::ValidatorService;
use anyhow::{Context, Result};
use axum::{
    Json, Router,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Shared by every handler
pub struct AppState {
    pub validator: ValidatorService,
    pub catalog: Arc<Catalog>,
    pub cache: Option<Arc<GraphCache>>,
}

impl AppState {
    pub fn new(validator: ValidatorService, catalog: Arc<Catalog>, cache: Option<Arc<GraphCache>>) -> Self {
        Self {
            validator,
            catalog,
            cache,
        }
    }

    /// Production wiring: HTTP fetcher, native evaluator, built-in catalog.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let cache = config
            .cache_enabled()
            .then(|| Arc::new(GraphCache::new(config.cache_capacity, config.cache_ttl())));
        let fetcher: Arc<dyn GraphFetcher> = Arc::new(
            HttpGraphFetcher::new(config.fetcher_config(), cache.clone())
                .context("failed to build HTTP client")?,
        );
        let catalog = Arc::new(Catalog::builtin());
        let engine = ExpansionEngine::new(fetcher.clone(), config.expansion_limits());
        let validator = ValidatorService::new(
            fetcher,
            Arc::new(NativeShaclEvaluator::new()),
            engine,
            catalog.clone(),
        )
        .with_request_timeout(config.request_timeout());
        Ok(Self::new(validator, catalog, cache))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(routes::ping))
        .route("/ready", get(routes::ready))
        .route("/metrics", get(routes::metrics))
        .route("/shapes", get(routes::list_shapes))
        .route("/shapes/{id}", get(routes::get_shapes))
        .route("/ontologies", get(routes::list_ontologies))
        .route("/ontologies/{id}", get(routes::get_ontology))
        .route("/validator", post(routes::validate))
        .with_state(state)
}

impl IntoResponse for ValidatorError {
    fn into_response(self) -> Response {
        (self.code().status(), Json(self.to_body())).into_response()
    }
}

/// Binds, serves until SIGINT/SIGTERM, then drains for at most the
/// configured shutdown timeout.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);
    let listener = TcpListener::bind(config.http_bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.http_bind_address))?;
    let local_addr = listener.local_addr()?;
    info!(
        bind = %local_addr,
        cache = config.cache_enabled(),
        max_import_rounds = config.max_import_rounds,
        "listening"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.cancel();
        }
    });

    let server = axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();

    let drain_timeout = config.shutdown_timeout();
    let drain_deadline = async {
        shutdown.cancelled().await;
        tokio::time::sleep(drain_timeout).await;
    };

    let result = tokio::select! {
        result = server => {
            info!("server stopped");
            result.map_err(anyhow::Error::from)
        }
        _ = drain_deadline => {
            warn!(
                timeout_secs = drain_timeout.as_secs(),
                "in-flight requests did not finish before the shutdown timeout"
            );
            Ok(())
        }
    };

    if let Some(cache) = &state.cache {
        let stats = cache.stats();
        info!(
            size = stats.size,
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = stats.hit_rate(),
            "graph cache statistics"
        );
    }
    result
}

/// Resolves on SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }
}
