//! Concurrent fetch batches with per-URI typed results

use crate::fetch::{FetchOutcome, FetchResult, GraphFetcher};
use crate::rdf::merge_into;
use futures::future::join_all;
use oxigraph::model::{Graph, NamedNode};
use serde::Serialize;
use tracing::debug;

/// Information about a URI that contributed no triples
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub uri: String,
    pub outcome: String,
    pub reason: String,
}

/// Result of one fan-out/join-all round
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// URIs whose graph was merged
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
    /// Triples that were new to the accumulator
    pub merged: usize,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn is_partial_success(&self) -> bool {
        !self.succeeded.is_empty() && !self.failed.is_empty()
    }

    /// Share of successful fetches, 0-100
    pub fn success_rate(&self) -> f64 {
        match self.total() {
            0 => 100.0,
            total => self.succeeded.len() as f64 / total as f64 * 100.0,
        }
    }

    /// Folds another batch into this one.
    pub fn absorb(&mut self, other: BatchOutcome) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.merged += other.merged;
    }

    pub fn failed_with(&self, outcome: FetchOutcome) -> impl Iterator<Item = &BatchFailure> {
        let label = outcome.to_string();
        self.failed.iter().filter(move |failure| failure.outcome == label)
    }
}

/// Fetches every URI concurrently and waits for all of them.
///
/// Results come back in input order regardless of completion order.
pub async fn fetch_all(
    fetcher: &dyn GraphFetcher,
    uris: &[NamedNode],
    use_cache: bool,
) -> Vec<(NamedNode, FetchResult)> {
    join_all(uris.iter().map(move |uri| async move {
        let result = fetcher.fetch(uri.as_str(), use_cache).await;
        (uri.clone(), result)
    }))
    .await
}

/// Merges successful results into `accumulator`; failures are logged and kept
/// in the outcome only.
pub fn merge_results(
    accumulator: &mut Graph,
    results: Vec<(NamedNode, FetchResult)>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for (uri, result) in results {
        match result {
            FetchResult::Success(graph) => {
                let added = merge_into(accumulator, &graph);
                debug!(uri = uri.as_str(), triples = graph.len(), added, "merged remote graph");
                outcome.merged += added;
                outcome.succeeded.push(uri.into_string());
            }
            failure => {
                let reason = failure.failure_reason().unwrap_or_default();
                debug!(uri = uri.as_str(), outcome = %failure.outcome(), %reason, "skipping unresolvable uri");
                outcome.failed.push(BatchFailure {
                    uri: uri.into_string(),
                    outcome: failure.outcome().to_string(),
                    reason,
                });
            }
        }
    }
    outcome
}
