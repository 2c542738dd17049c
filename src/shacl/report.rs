//! Validation results and the `sh:ValidationReport` graph built from them.

use super::shapes::Path;
use crate::rdf::vocab::sh;
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{BlankNode, Graph, Literal, NamedNode, NamedNodeRef, Term, Triple};
use serde::Serialize;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
pub enum Severity {
    Info,
    Warning,
    Violation,
}

impl Severity {
    /// Unknown severities count as violations.
    pub fn from_iri(iri: NamedNodeRef<'_>) -> Self {
        if iri == sh::INFO {
            Severity::Info
        } else if iri == sh::WARNING {
            Severity::Warning
        } else {
            Severity::Violation
        }
    }

    pub fn iri(self) -> NamedNodeRef<'static> {
        match self {
            Severity::Info => sh::INFO,
            Severity::Warning => sh::WARNING,
            Severity::Violation => sh::VIOLATION,
        }
    }
}

/// SHACL Core constraint components checked by the native evaluator.
///
/// Displays as the local name without the `ConstraintComponent` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum ConstraintComponent {
    MinCount,
    MaxCount,
    Datatype,
    Class,
    NodeKind,
    Pattern,
    MinLength,
    MaxLength,
    MinInclusive,
    MaxInclusive,
    MinExclusive,
    MaxExclusive,
    In,
    HasValue,
    UniqueLang,
}

impl ConstraintComponent {
    pub fn iri(self) -> NamedNode {
        NamedNode::new_unchecked(format!("{}{self}ConstraintComponent", sh::NAMESPACE))
    }
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub focus_node: Term,
    pub result_path: Option<Path>,
    pub value: Option<Term>,
    pub message: String,
    pub severity: Severity,
    pub source_shape: Term,
    pub component: ConstraintComponent,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    results: Vec<ValidationResult>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, result: ValidationResult) {
        self.results.push(result);
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = ValidationResult>) {
        self.results.extend(results);
    }

    /// Any result, whatever its severity, breaks conformance
    pub fn conforms(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[ValidationResult] {
        &self.results
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.results
            .iter()
            .filter(|result| result.severity == severity)
            .count()
    }

    /// Renders the report with the standard `sh:` vocabulary.
    pub fn to_graph(&self) -> Graph {
        let mut graph = Graph::new();
        let report = BlankNode::default();

        graph.insert(&Triple::new(report.clone(), rdf::TYPE, sh::VALIDATION_REPORT.into_owned()));
        graph.insert(&Triple::new(
            report.clone(),
            sh::CONFORMS,
            Literal::new_typed_literal(self.conforms().to_string(), xsd::BOOLEAN),
        ));

        for result in &self.results {
            let node = BlankNode::default();
            graph.insert(&Triple::new(report.clone(), sh::RESULT, node.clone()));
            graph.insert(&Triple::new(node.clone(), rdf::TYPE, sh::VALIDATION_RESULT.into_owned()));
            graph.insert(&Triple::new(node.clone(), sh::FOCUS_NODE, result.focus_node.clone()));
            graph.insert(&Triple::new(
                node.clone(),
                sh::RESULT_MESSAGE,
                Literal::new_simple_literal(&result.message),
            ));
            graph.insert(&Triple::new(node.clone(), sh::RESULT_SEVERITY, result.severity.iri().into_owned()));
            graph.insert(&Triple::new(node.clone(), sh::SOURCE_SHAPE, result.source_shape.clone()));
            graph.insert(&Triple::new(
                node.clone(),
                sh::SOURCE_CONSTRAINT_COMPONENT,
                result.component.iri(),
            ));
            if let Some(value) = &result.value {
                graph.insert(&Triple::new(node.clone(), sh::VALUE, value.clone()));
            }
            match &result.result_path {
                Some(Path::Predicate(predicate)) => {
                    graph.insert(&Triple::new(node.clone(), sh::RESULT_PATH, predicate.clone()));
                }
                Some(Path::Inverse(predicate)) => {
                    let path = BlankNode::default();
                    graph.insert(&Triple::new(node.clone(), sh::RESULT_PATH, path.clone()));
                    graph.insert(&Triple::new(path, sh::INVERSE_PATH, predicate.clone()));
                }
                None => {}
            }
        }
        graph
    }
}
