//! Remote graph retrieval.
//!
//! A [`GraphFetcher`] dereferences a URI and hands back a [`FetchResult`]. The
//! result is a value, not an error: callers loading a mandatory graph turn the
//! failure variants into request errors, while the expansion engine logs and
//! skips them.

pub mod cache;
pub mod http;
pub mod retry;

pub use cache::{CacheStats, GraphCache};
pub use http::{FetcherConfig, HttpGraphFetcher};
pub use retry::{ErrorClass, RetryConfig};

use async_trait::async_trait;
use oxigraph::model::Graph;
use strum::{Display, IntoStaticStr};

/// Outcome of dereferencing one URI.
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// HTTP 200 with a body that parsed under a supported serialization.
    Success(Graph),
    /// Any status other than 200.
    NotFound { status: u16 },
    /// Network failure, after retries when the failure was transient.
    TransientError { reason: String, attempts: u32 },
    /// HTTP 200 but the body matched no supported serialization.
    ParseError { reason: String },
}

/// Variant name of a [`FetchResult`], used for logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum FetchOutcome {
    Success,
    NotFound,
    TransientError,
    ParseError,
}

impl FetchResult {
    pub fn outcome(&self) -> FetchOutcome {
        match self {
            FetchResult::Success(_) => FetchOutcome::Success,
            FetchResult::NotFound { .. } => FetchOutcome::NotFound,
            FetchResult::TransientError { .. } => FetchOutcome::TransientError,
            FetchResult::ParseError { .. } => FetchOutcome::ParseError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success(_))
    }

    pub fn into_graph(self) -> Option<Graph> {
        match self {
            FetchResult::Success(graph) => Some(graph),
            _ => None,
        }
    }

    /// Human-readable failure description; `None` for successes.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            FetchResult::Success(_) => None,
            FetchResult::NotFound { status } => Some(format!("status = {status}")),
            FetchResult::TransientError { reason, attempts } => {
                Some(format!("{reason} (after {attempts} attempt(s))"))
            }
            FetchResult::ParseError { reason } => Some(reason.clone()),
        }
    }
}

/// Dereferences URIs into graphs.
///
/// `use_cache = false` must bypass any cache in both directions.
#[async_trait]
pub trait GraphFetcher: Send + Sync {
    async fn fetch(&self, uri: &str, use_cache: bool) -> FetchResult;
}
