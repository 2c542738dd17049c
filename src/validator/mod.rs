//! Validation orchestrator.
//!
//! [`ValidatorService`] owns the collaborators (fetcher, evaluator, catalog)
//! and drives each request through the phases of [`pipeline`]. Fatal
//! problems with the mandatory inputs surface as [`ValidatorError`]; failures
//! while expanding are absorbed by the expansion engine.

pub mod pipeline;

pub use pipeline::{
    Expanded, GraphsLoaded, Initialized, ReportAssembled, Validated, ValidationPipeline,
};

use crate::catalog::Catalog;
use crate::error::{GraphRole, ValidatorError};
use crate::expansion::{ExpansionEngine, ExpansionReport, ImportReport};
use crate::fetch::{FetchResult, GraphFetcher};
use crate::metrics::ValidationMetrics;
use crate::rdf::{merge_into, parse_graph};
use crate::shacl::ShaclEvaluator;
use oxigraph::model::Graph;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Per-request switches
///
/// The two flags accept any truthy value: booleans, numbers (zero is false),
/// `null` (false) and strings, where `""`, `"false"`, `"0"`, `"no"` and
/// `"off"` are false in any case and every other string is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    /// Resolve `owl:imports` and dereference referenced IRIs before checking
    #[serde(deserialize_with = "truthy")]
    pub expand: bool,
    /// Add the ontology graph to the response graph
    #[serde(deserialize_with = "truthy")]
    pub include_expanded_triples: bool,
    /// Catalog shapes graph to use when no shapes graph is supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shapes_id: Option<String>,
    /// Catalog ontology graph to use when no ontology graph is supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ontology_id: Option<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            expand: true,
            include_expanded_triples: false,
            shapes_id: None,
            ontology_id: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Number(f64),
    Text(String),
    Null,
}

fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(flag) => flag,
        Flag::Number(number) => number != 0.0,
        Flag::Text(text) => !matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "" | "false" | "0" | "no" | "off"
        ),
        Flag::Null => false,
    })
}

/// Where a caller-supplied graph comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphSource {
    /// Serialized graph in any supported syntax
    Text(String),
    /// Location to dereference, bypassing the cache
    Url(String),
}

impl GraphSource {
    /// Resolves a text/URL pair where at most one may be given.
    pub fn from_pair(
        role: GraphRole,
        text: Option<String>,
        url: Option<String>,
    ) -> Result<Option<Self>, ValidatorError> {
        match (text, url) {
            (Some(_), Some(_)) => Err(ValidatorError::input(format!(
                "Multiple {role} graphs in input."
            ))),
            (Some(text), None) => Ok(Some(GraphSource::Text(text))),
            (None, Some(url)) => Ok(Some(GraphSource::Url(url))),
            (None, None) => Ok(None),
        }
    }

    /// Like [`GraphSource::from_pair`], failing when neither is given.
    pub fn required(
        role: GraphRole,
        text: Option<String>,
        url: Option<String>,
    ) -> Result<Self, ValidatorError> {
        Self::from_pair(role, text, url)?
            .ok_or_else(|| ValidatorError::input(format!("No {role} graph in input.")))
    }
}

/// Decoded validation request
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub data: GraphSource,
    /// Falls back to `config.shapes_id`
    pub shapes: Option<GraphSource>,
    /// Falls back to `config.ontology_id`, then to an empty graph
    pub ontology: Option<GraphSource>,
    pub config: ValidationConfig,
}

impl ValidationRequest {
    pub fn new(data: GraphSource, shapes: GraphSource) -> Self {
        Self {
            data,
            shapes: Some(shapes),
            ontology: None,
            config: ValidationConfig::default(),
        }
    }

    pub fn with_ontology(mut self, ontology: GraphSource) -> Self {
        self.ontology = Some(ontology);
        self
    }

    pub fn with_config(mut self, config: ValidationConfig) -> Self {
        self.config = config;
        self
    }
}

/// What the expansion phase did, when it ran
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpansionSummary {
    pub imports: Option<ImportReport>,
    pub objects: Option<ExpansionReport>,
}

impl ExpansionSummary {
    pub fn merged(&self) -> usize {
        self.imports.as_ref().map_or(0, ImportReport::merged)
            + self.objects.as_ref().map_or(0, ExpansionReport::merged)
    }
}

/// Result of a successful request
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub conforms: bool,
    pub data: Graph,
    pub ontology: Graph,
    pub report: Graph,
    pub expansion: ExpansionSummary,
    include_expanded_triples: bool,
}

impl ValidationOutcome {
    /// Report ∪ data, plus the ontology when the request asked for the
    /// expanded triples.
    pub fn response_graph(&self) -> Graph {
        let mut graph = self.report.clone();
        merge_into(&mut graph, &self.data);
        if self.include_expanded_triples {
            merge_into(&mut graph, &self.ontology);
        }
        graph
    }
}

pub struct ValidatorService {
    fetcher: Arc<dyn GraphFetcher>,
    evaluator: Arc<dyn ShaclEvaluator>,
    engine: ExpansionEngine,
    catalog: Arc<Catalog>,
    request_timeout: Option<Duration>,
}

impl ValidatorService {
    pub fn new(
        fetcher: Arc<dyn GraphFetcher>,
        evaluator: Arc<dyn ShaclEvaluator>,
        engine: ExpansionEngine,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            fetcher,
            evaluator,
            engine,
            catalog,
            request_timeout: None,
        }
    }

    /// Deadline for a whole request; `None` disables it.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Runs a request end to end.
    pub async fn validate(
        &self,
        request: ValidationRequest,
    ) -> Result<ValidationOutcome, ValidatorError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("validation", %request_id);
        let metrics = ValidationMetrics::start();

        let result = async {
            match self.request_timeout {
                Some(after) => tokio::time::timeout(after, self.run(request))
                    .await
                    .unwrap_or_else(|_| Err(ValidatorError::Timeout { after })),
                None => self.run(request).await,
            }
        }
        .instrument(span.clone())
        .await;

        let _entered = span.enter();
        match &result {
            Ok(outcome) => {
                info!(
                    conforms = outcome.conforms,
                    data = outcome.data.len(),
                    ontology = outcome.ontology.len(),
                    expanded = outcome.expansion.merged(),
                    "validation finished"
                );
                metrics.finish(if outcome.conforms {
                    "conforms"
                } else {
                    "violations"
                });
            }
            Err(error) => {
                if error.code().is_client_error() {
                    info!(code = %error.code(), %error, "validation rejected");
                } else {
                    warn!(code = %error.code(), %error, "validation failed");
                }
                let label: &'static str = error.code().into();
                metrics.finish(label);
            }
        }
        result
    }

    async fn run(&self, request: ValidationRequest) -> Result<ValidationOutcome, ValidatorError> {
        let outcome = ValidationPipeline::new(self, request)
            .load_graphs()
            .await?
            .expand()
            .await
            .validate()?
            .assemble()
            .into_outcome();
        Ok(outcome)
    }

    /// Loads a caller-supplied graph. URLs bypass the cache.
    async fn load_source(
        &self,
        source: &GraphSource,
        role: GraphRole,
    ) -> Result<Graph, ValidatorError> {
        match source {
            GraphSource::Text(text) => {
                parse_graph(text, None, None).map_err(|e| ValidatorError::Parse {
                    graph: role,
                    reason: format!("tried {}: {}", e.tried, e.reason),
                })
            }
            GraphSource::Url(url) => self.fetch_mandatory(url, role, false).await,
        }
    }

    /// Loads a catalog graph by id. Catalog documents may come from the cache.
    async fn load_catalog_graph(&self, id: &str, role: GraphRole) -> Result<Graph, ValidatorError> {
        let collection = match role {
            GraphRole::Ontology => &self.catalog.ontologies,
            _ => &self.catalog.shapes,
        };
        let description = collection
            .get_by_id(id)
            .ok_or_else(|| ValidatorError::input(format!("Unknown {role} graph id: {id}")))?;
        debug!(id, url = %description.url, "loading catalog graph");
        self.fetch_mandatory(&description.url, role, true).await
    }

    async fn fetch_mandatory(
        &self,
        url: &str,
        role: GraphRole,
        use_cache: bool,
    ) -> Result<Graph, ValidatorError> {
        match self.fetcher.fetch(url, use_cache).await {
            FetchResult::Success(graph) => Ok(graph),
            FetchResult::ParseError { reason } => Err(ValidatorError::Parse {
                graph: role,
                reason,
            }),
            failure => Err(ValidatorError::Fetch {
                graph: role,
                url: url.to_string(),
                reason: failure.failure_reason().unwrap_or_default(),
            }),
        }
    }
}
