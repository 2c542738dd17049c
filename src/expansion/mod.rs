//! Graph expansion: pulls in the remote triples a data graph depends on.
//!
//! Two passes feed the caller-owned ontology accumulator:
//!
//! - [`ExpansionEngine::resolve_imports`] follows `owl:imports` to a fixed
//!   point, fetching each imported document at most once per request.
//! - [`ExpansionEngine::expand_objects`] dereferences the IRIs the data graph
//!   points at but does not describe.
//!
//! Both fan out their fetches concurrently, join on the whole batch and merge
//! sequentially afterwards, so the accumulator never sees concurrent writes and
//! the result does not depend on completion order. Fetch failures are recorded
//! in the returned reports and never abort the caller.

pub mod batch;

pub use batch::{BatchFailure, BatchOutcome};

use crate::fetch::GraphFetcher;
use crate::metrics::METRICS;
use crate::rdf::vocab::owl;
use crate::rdf::{has_subject, referenced_object_iris, take_imports};
use indexmap::IndexSet;
use oxigraph::model::{Graph, NamedNode, TermRef};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Safety bounds for the import fixed point
#[derive(Debug, Clone, Copy)]
pub struct ExpansionLimits {
    pub max_import_rounds: u32,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self {
            max_import_rounds: 32,
        }
    }
}

/// Summary of one object-expansion pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpansionReport {
    /// Distinct IRIs referenced as objects, `rdf:type` excluded
    pub candidates: usize,
    /// Candidates already described locally
    pub skipped: usize,
    pub batch: BatchOutcome,
}

impl ExpansionReport {
    pub fn fetched(&self) -> usize {
        self.batch.total()
    }

    pub fn merged(&self) -> usize {
        self.batch.merged
    }
}

/// Summary of import resolution
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Scan rounds, including the final one that found no imports
    pub rounds: u32,
    /// Import targets skipped because they were already described or visited
    pub skipped: usize,
    pub batch: BatchOutcome,
    /// True when the round limit stopped resolution early
    pub truncated: bool,
}

impl ImportReport {
    pub fn fetched(&self) -> usize {
        self.batch.total()
    }

    pub fn merged(&self) -> usize {
        self.batch.merged
    }
}

pub struct ExpansionEngine {
    fetcher: Arc<dyn GraphFetcher>,
    limits: ExpansionLimits,
}

impl ExpansionEngine {
    pub fn new(fetcher: Arc<dyn GraphFetcher>, limits: ExpansionLimits) -> Self {
        Self { fetcher, limits }
    }

    /// Fetches every IRI object of `data` that neither graph describes and
    /// merges the results into `ontology`.
    ///
    /// Only objects of the data graph are considered; triples merged here are
    /// not expanded further.
    pub async fn expand_objects(&self, data: &Graph, ontology: &mut Graph) -> ExpansionReport {
        let candidates = referenced_object_iris(data);
        let total = candidates.len();
        let known: &Graph = ontology;
        let work: Vec<NamedNode> = candidates
            .into_iter()
            .filter(|object| !is_described(object, data, known))
            .collect();

        let mut report = ExpansionReport {
            candidates: total,
            skipped: total - work.len(),
            ..Default::default()
        };
        if work.is_empty() {
            debug!(candidates = total, "nothing to expand");
            return report;
        }

        debug!(work_set = work.len(), skipped = report.skipped, "expanding object uris");
        let results = batch::fetch_all(self.fetcher.as_ref(), &work, true).await;
        report.batch = batch::merge_results(ontology, results);
        METRICS.record_merged_triples(report.batch.merged);

        info!(
            work_set = work.len(),
            succeeded = report.batch.succeeded.len(),
            failed = report.batch.failed.len(),
            merged = report.batch.merged,
            success_rate = report.batch.success_rate(),
            "object expansion finished"
        );
        report
    }

    /// Resolves `owl:imports` until no import statement is left.
    ///
    /// Each round removes every import statement from `ontology`, fetches the
    /// targets that are neither described nor visited yet and merges them, which
    /// may bring in new import statements for the next round. The data graph is
    /// never modified; its own import targets join the first round.
    pub async fn resolve_imports(&self, data: &Graph, ontology: &mut Graph) -> ImportReport {
        let mut report = ImportReport::default();
        let mut visited: HashSet<NamedNode> = HashSet::new();
        let mut seeded = imported_by(data);

        loop {
            if report.rounds >= self.limits.max_import_rounds {
                let leftover = take_imports(ontology).len() + seeded.len();
                if leftover > 0 {
                    warn!(
                        rounds = report.rounds,
                        leftover, "import round limit reached, dropping remaining imports"
                    );
                    report.truncated = true;
                }
                break;
            }
            report.rounds += 1;

            let mut targets = take_imports(ontology);
            targets.extend(seeded.drain(..));
            if targets.is_empty() {
                break;
            }

            let found = targets.len();
            let known: &Graph = ontology;
            let work: Vec<NamedNode> = targets
                .into_iter()
                .filter(|target| visited.insert(target.clone()))
                .filter(|target| !is_described(target, data, known))
                .collect();
            report.skipped += found - work.len();
            if work.is_empty() {
                continue;
            }

            debug!(round = report.rounds, work_set = work.len(), "resolving imports");
            let results = batch::fetch_all(self.fetcher.as_ref(), &work, true).await;
            let outcome = batch::merge_results(ontology, results);
            METRICS.record_merged_triples(outcome.merged);
            report.batch.absorb(outcome);
        }

        info!(
            rounds = report.rounds,
            fetched = report.fetched(),
            merged = report.merged(),
            truncated = report.truncated,
            "import resolution finished"
        );
        report
    }
}

fn is_described(iri: &NamedNode, data: &Graph, ontology: &Graph) -> bool {
    has_subject(data, iri.as_ref()) || has_subject(ontology, iri.as_ref())
}

/// IRI targets of `owl:imports` statements, without removing them.
fn imported_by(graph: &Graph) -> IndexSet<NamedNode> {
    graph
        .triples_for_predicate(owl::IMPORTS)
        .filter_map(|triple| match triple.object {
            TermRef::NamedNode(target) => Some(target.into_owned()),
            _ => None,
        })
        .collect()
}
