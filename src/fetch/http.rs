//! HTTP implementation of [`GraphFetcher`].

use super::cache::GraphCache;
use super::retry::{RetryConfig, classify, retry_async};
use super::{FetchResult, GraphFetcher};
use crate::metrics::METRICS;
use crate::rdf::{RdfSerialization, parse_graph};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, debug_span, warn};

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Per-attempt timeout covering connect, headers and body
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Raw response of one successful round-trip.
struct Fetched {
    status: u16,
    final_url: String,
    content_type: Option<String>,
    body: String,
}

/// Dereferences URIs over HTTP(S), optionally through a shared [`GraphCache`].
pub struct HttpGraphFetcher {
    client: reqwest::Client,
    retry: RetryConfig,
    cache: Option<Arc<GraphCache>>,
}

impl HttpGraphFetcher {
    pub fn new(config: FetcherConfig, cache: Option<Arc<GraphCache>>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;
        Ok(Self {
            client,
            retry: config.retry,
            cache,
        })
    }

    async fn fetch_uncached(&self, uri: &str) -> FetchResult {
        let client = &self.client;
        let response = retry_async(&self.retry, uri, classify, move || async move {
            let response = client
                .get(uri)
                .header(ACCEPT, RdfSerialization::accept_header())
                .send()
                .await?;
            let status = response.status().as_u16();
            let final_url = response.url().to_string();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            // Only a 200 body is ever parsed
            let body = if status == 200 {
                response.text().await?
            } else {
                String::new()
            };
            Ok::<_, reqwest::Error>(Fetched {
                status,
                final_url,
                content_type,
                body,
            })
        })
        .await;

        let fetched = match response {
            Ok(fetched) => fetched,
            Err(failure) => {
                warn!(uri, attempts = failure.attempts, error = %failure.error, "fetch failed");
                return FetchResult::TransientError {
                    reason: failure.error.to_string(),
                    attempts: failure.attempts,
                };
            }
        };

        if fetched.status != 200 {
            debug!(uri, status = fetched.status, "non-success status");
            return FetchResult::NotFound {
                status: fetched.status,
            };
        }

        let hint = fetched
            .content_type
            .as_deref()
            .and_then(RdfSerialization::from_media_type);
        match parse_graph(&fetched.body, hint, Some(&fetched.final_url)) {
            Ok(graph) => FetchResult::Success(graph),
            Err(error) => {
                debug!(uri, %error, "response body did not parse");
                FetchResult::ParseError {
                    reason: error.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl GraphFetcher for HttpGraphFetcher {
    async fn fetch(&self, uri: &str, use_cache: bool) -> FetchResult {
        let cache = self.cache.as_ref().filter(|_| use_cache);

        if let Some(graph) = cache.and_then(|cache| cache.get(uri)) {
            debug!(uri, triples = graph.len(), "graph served from cache");
            METRICS.record_fetch("cache_hit");
            return FetchResult::Success(graph.as_ref().clone());
        }

        let result = self
            .fetch_uncached(uri)
            .instrument(debug_span!("fetch_graph", uri))
            .await;
        let outcome: &'static str = result.outcome().into();
        METRICS.record_fetch(outcome);

        if let (Some(cache), FetchResult::Success(graph)) = (cache, &result) {
            cache.insert(uri, graph.clone());
        }
        result
    }
}
