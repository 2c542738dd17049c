/// Prometheus metrics for graph fetching, caching and validation requests.
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics registry instance
pub static METRICS: Lazy<Arc<MetricsCollector>> = Lazy::new(|| Arc::new(MetricsCollector::new()));

/// Labels for remote graph fetches
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FetchLabels {
    /// "success", "not_found", "transient_error", "parse_error" or "cache_hit"
    pub outcome: String,
}

/// Labels for validation requests
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ValidationLabels {
    /// "conforms", "violations" or an error code
    pub outcome: String,
}

/// Central metrics collector with Prometheus registry
pub struct MetricsCollector {
    registry: RwLock<Registry>,

    /// Remote graph fetches by outcome
    pub graph_fetch_total: Family<FetchLabels, Counter>,
    /// Retried fetch attempts
    pub graph_fetch_retries_total: Counter,
    pub graph_cache_hits_total: Counter,
    pub graph_cache_misses_total: Counter,

    /// Validation requests by outcome
    pub validations_total: Family<ValidationLabels, Counter>,
    pub validation_duration_seconds: Histogram,
    pub active_validations: Gauge,

    /// Triples added to ontology graphs by expansion and import resolution
    pub expansion_triples_merged_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let graph_fetch_total = Family::<FetchLabels, Counter>::default();
        registry.register(
            "graph_fetch_total",
            "Remote graph fetches by outcome",
            graph_fetch_total.clone(),
        );

        let graph_fetch_retries_total = Counter::default();
        registry.register(
            "graph_fetch_retries_total",
            "Fetch attempts repeated after a transient network failure",
            graph_fetch_retries_total.clone(),
        );

        let graph_cache_hits_total = Counter::default();
        registry.register(
            "graph_cache_hits_total",
            "Remote graphs served from the cache",
            graph_cache_hits_total.clone(),
        );

        let graph_cache_misses_total = Counter::default();
        registry.register(
            "graph_cache_misses_total",
            "Cache lookups that required a network round-trip",
            graph_cache_misses_total.clone(),
        );

        let validations_total = Family::<ValidationLabels, Counter>::default();
        registry.register(
            "validations_total",
            "Validation requests by outcome",
            validations_total.clone(),
        );

        // 50ms .. ~100s
        let validation_duration_seconds = Histogram::new(exponential_buckets(0.05, 2.0, 12));
        registry.register(
            "validation_duration_seconds",
            "End-to-end validation latency in seconds",
            validation_duration_seconds.clone(),
        );

        let active_validations = Gauge::default();
        registry.register(
            "active_validations",
            "Validation requests currently in progress",
            active_validations.clone(),
        );

        let expansion_triples_merged_total = Counter::default();
        registry.register(
            "expansion_triples_merged_total",
            "Triples merged into ontology graphs during expansion",
            expansion_triples_merged_total.clone(),
        );

        Self {
            registry: RwLock::new(registry),
            graph_fetch_total,
            graph_fetch_retries_total,
            graph_cache_hits_total,
            graph_cache_misses_total,
            validations_total,
            validation_duration_seconds,
            active_validations,
            expansion_triples_merged_total,
        }
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        if let Err(error) = encode(&mut buffer, &registry) {
            tracing::warn!(%error, "failed to encode metrics");
        }
        buffer
    }

    pub fn record_fetch(&self, outcome: &str) {
        self.graph_fetch_total
            .get_or_create(&FetchLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_retry(&self) {
        self.graph_fetch_retries_total.inc();
    }

    pub fn record_cache_hit(&self) {
        self.graph_cache_hits_total.inc();
    }

    pub fn record_cache_miss(&self) {
        self.graph_cache_misses_total.inc();
    }

    pub fn record_merged_triples(&self, count: usize) {
        self.expansion_triples_merged_total.inc_by(count as u64);
    }

    pub fn record_validation(&self, outcome: &str, duration: Duration) {
        self.validations_total
            .get_or_create(&ValidationLabels {
                outcome: outcome.to_string(),
            })
            .inc();
        self.validation_duration_seconds
            .observe(duration.as_secs_f64());
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard timing one validation request.
///
/// Dropping the guard without calling [`ValidationMetrics::finish`] records
/// the request as `aborted` (the request future was cancelled).
pub struct ValidationMetrics {
    start: Instant,
    completed: bool,
}

impl ValidationMetrics {
    pub fn start() -> Self {
        METRICS.active_validations.inc();
        Self {
            start: Instant::now(),
            completed: false,
        }
    }

    pub fn finish(mut self, outcome: &str) {
        METRICS.record_validation(outcome, self.start.elapsed());
        METRICS.active_validations.dec();
        self.completed = true;
    }
}

impl Drop for ValidationMetrics {
    fn drop(&mut self) {
        if !self.completed {
            METRICS.record_validation("aborted", self.start.elapsed());
            METRICS.active_validations.dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_families() {
        let collector = MetricsCollector::new();
        collector.record_fetch("success");
        collector.record_retry();
        collector.record_validation("conforms", Duration::from_millis(20));

        let text = collector.encode();
        assert!(text.contains("graph_fetch_total"));
        assert!(text.contains("outcome=\"success\""));
        assert!(text.contains("graph_fetch_retries_total"));
        assert!(text.contains("validation_duration_seconds"));
    }

    #[test]
    fn dropped_guard_counts_as_aborted() {
        {
            let _guard = ValidationMetrics::start();
        }
        assert!(METRICS.encode().contains("outcome=\"aborted\""));
    }
}
