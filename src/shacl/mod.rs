//! SHACL evaluation.
//!
//! The orchestrator only depends on [`ShaclEvaluator`]. [`NativeShaclEvaluator`]
//! is the built-in implementation: it covers the SHACL Core constraints used
//! by application profiles (cardinality, value type, string, range and
//! enumeration constraints on predicate and inverse paths) with optional RDFS
//! entailment, and renders results as a standard `sh:ValidationReport` graph.

pub mod constraints;
pub mod inference;
pub mod nav;
pub mod report;
pub mod shapes;

pub use constraints::ConstraintChecker;
pub use report::{ConstraintComponent, Severity, ValidationReport, ValidationResult};
pub use shapes::{Path, Shape, load_shapes};

use crate::rdf::merge_into;
use oxigraph::model::Graph;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, info_span};

/// Entailment applied to the data graph before checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    None,
    #[default]
    Rdfs,
}

#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("invalid shape {shape}: {reason}")]
    InvalidShape { shape: String, reason: String },
}

/// Conformance verdict with its report graph
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub conforms: bool,
    pub report_graph: Graph,
    pub result_count: usize,
}

/// Checks a data graph against a shapes graph.
///
/// Implementations are synchronous and CPU-bound; they must not mutate
/// their inputs.
pub trait ShaclEvaluator: Send + Sync {
    fn evaluate(
        &self,
        data: &Graph,
        shapes: &Graph,
        ontology: &Graph,
        inference: InferenceMode,
    ) -> Result<Evaluation, EvaluatorError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeShaclEvaluator;

impl NativeShaclEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Graph the constraints are checked against.
    ///
    /// With RDFS entailment the ontology is mixed in and the union is closed;
    /// without it the data graph is used as-is.
    fn working_graph(data: &Graph, ontology: &Graph, mode: InferenceMode) -> Graph {
        match mode {
            InferenceMode::None => data.clone(),
            InferenceMode::Rdfs => {
                let mut graph = data.clone();
                merge_into(&mut graph, ontology);
                let inferred = inference::rdfs_closure(&mut graph);
                debug!(inferred, triples = graph.len(), "rdfs closure computed");
                graph
            }
        }
    }
}

impl ShaclEvaluator for NativeShaclEvaluator {
    fn evaluate(
        &self,
        data: &Graph,
        shapes: &Graph,
        ontology: &Graph,
        inference: InferenceMode,
    ) -> Result<Evaluation, EvaluatorError> {
        let _span = info_span!("shacl_evaluate", %inference).entered();

        let shapes = load_shapes(shapes)?;
        let working = Self::working_graph(data, ontology, inference);
        let checker = ConstraintChecker::new(&working);

        let mut report = ValidationReport::new();
        for shape in &shapes {
            report.extend(checker.check_shape(shape));
        }

        debug!(
            shapes = shapes.len(),
            results = report.results().len(),
            violations = report.count_by_severity(Severity::Violation),
            "evaluation finished"
        );
        Ok(Evaluation {
            conforms: report.conforms(),
            result_count: report.results().len(),
            report_graph: report.to_graph(),
        })
    }
}
