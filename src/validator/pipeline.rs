//! Request phases as a typestate pipeline.
//!
//! `Initialized -> GraphsLoaded -> Expanded -> Validated -> ReportAssembled`.
//! Each transition consumes the previous phase, so a request cannot be
//! evaluated before its graphs are loaded or reported before it is evaluated.
//! The failed state is the `Err` returned by a fallible transition.

use super::{ExpansionSummary, GraphSource, ValidationConfig, ValidationOutcome, ValidationRequest, ValidatorService};
use crate::error::{GraphRole, ValidatorError};
use crate::shacl::{Evaluation, InferenceMode};
use oxigraph::model::Graph;
use tracing::debug;

/// Sources not loaded yet
pub struct Initialized {
    data: GraphSource,
    shapes: Option<GraphSource>,
    ontology: Option<GraphSource>,
}

/// Data and shapes graphs are present and non-empty
pub struct GraphsLoaded;

/// Ontology graph holds everything expansion could pull in
pub struct Expanded;

pub struct Validated {
    evaluation: Evaluation,
}

pub struct ReportAssembled {
    outcome: ValidationOutcome,
}

#[derive(Default)]
struct Graphs {
    data: Graph,
    shapes: Graph,
    ontology: Graph,
}

pub struct ValidationPipeline<'a, State> {
    service: &'a ValidatorService,
    config: ValidationConfig,
    graphs: Graphs,
    expansion: ExpansionSummary,
    state: State,
}

impl<'a, State> ValidationPipeline<'a, State> {
    fn transition<Next>(self, state: Next) -> ValidationPipeline<'a, Next> {
        ValidationPipeline {
            service: self.service,
            config: self.config,
            graphs: self.graphs,
            expansion: self.expansion,
            state,
        }
    }
}

impl<'a> ValidationPipeline<'a, Initialized> {
    pub fn new(service: &'a ValidatorService, request: ValidationRequest) -> Self {
        Self {
            service,
            config: request.config,
            graphs: Graphs::default(),
            expansion: ExpansionSummary::default(),
            state: Initialized {
                data: request.data,
                shapes: request.shapes,
                ontology: request.ontology,
            },
        }
    }

    /// Parses or fetches the three input graphs.
    ///
    /// Shapes and ontology come from the request or from a catalog id, never
    /// both. Emptiness is checked once everything has parsed.
    pub async fn load_graphs(mut self) -> Result<ValidationPipeline<'a, GraphsLoaded>, ValidatorError> {
        let service = self.service;

        let data = service.load_source(&self.state.data, GraphRole::Data).await?;

        let shapes = match (&self.state.shapes, &self.config.shapes_id) {
            (Some(_), Some(_)) => {
                return Err(ValidatorError::input("Multiple shapes graphs in input."));
            }
            (Some(source), None) => service.load_source(source, GraphRole::Shapes).await?,
            (None, Some(id)) => service.load_catalog_graph(id, GraphRole::Shapes).await?,
            (None, None) => return Err(ValidatorError::input("No shapes graph in input.")),
        };

        let ontology = match (&self.state.ontology, &self.config.ontology_id) {
            (Some(_), Some(_)) => {
                return Err(ValidatorError::input("Multiple ontology graphs in input."));
            }
            (Some(source), None) => service.load_source(source, GraphRole::Ontology).await?,
            (None, Some(id)) => service.load_catalog_graph(id, GraphRole::Ontology).await?,
            (None, None) => Graph::new(),
        };

        if data.is_empty() {
            return Err(ValidatorError::EmptyGraph {
                graph: GraphRole::Data,
            });
        }
        if shapes.is_empty() {
            return Err(ValidatorError::EmptyGraph {
                graph: GraphRole::Shapes,
            });
        }

        debug!(
            phase = "graphs_loaded",
            data = data.len(),
            shapes = shapes.len(),
            ontology = ontology.len(),
        );
        self.graphs = Graphs {
            data,
            shapes,
            ontology,
        };
        Ok(self.transition(GraphsLoaded))
    }
}

impl<'a> ValidationPipeline<'a, GraphsLoaded> {
    /// Resolves imports, then expands object IRIs. Skipped entirely when
    /// `expand` is off. Never fails.
    pub async fn expand(mut self) -> ValidationPipeline<'a, Expanded> {
        if self.config.expand {
            let engine = &self.service.engine;
            let Graphs { data, ontology, .. } = &mut self.graphs;

            let imports = engine.resolve_imports(data, ontology).await;
            let objects = engine.expand_objects(data, ontology).await;
            self.expansion = ExpansionSummary {
                imports: Some(imports),
                objects: Some(objects),
            };
        }
        debug!(
            phase = "expanded",
            expand = self.config.expand,
            ontology = self.graphs.ontology.len(),
            merged = self.expansion.merged(),
        );
        self.transition(Expanded)
    }
}

impl<'a> ValidationPipeline<'a, Expanded> {
    pub fn validate(self) -> Result<ValidationPipeline<'a, Validated>, ValidatorError> {
        let Graphs {
            data,
            shapes,
            ontology,
        } = &self.graphs;
        let evaluation = self
            .service
            .evaluator
            .evaluate(data, shapes, ontology, InferenceMode::Rdfs)?;
        debug!(
            phase = "validated",
            conforms = evaluation.conforms,
            results = evaluation.result_count,
        );
        Ok(self.transition(Validated { evaluation }))
    }
}

impl<'a> ValidationPipeline<'a, Validated> {
    pub fn assemble(self) -> ValidationPipeline<'a, ReportAssembled> {
        let include_expanded_triples = self.config.include_expanded_triples;
        let outcome = ValidationOutcome {
            conforms: self.state.evaluation.conforms,
            report: self.state.evaluation.report_graph,
            data: self.graphs.data,
            ontology: self.graphs.ontology,
            expansion: self.expansion,
            include_expanded_triples,
        };
        ValidationPipeline {
            service: self.service,
            config: self.config,
            graphs: Graphs::default(),
            expansion: ExpansionSummary::default(),
            state: ReportAssembled { outcome },
        }
    }
}

impl ValidationPipeline<'_, ReportAssembled> {
    pub fn into_outcome(self) -> ValidationOutcome {
        self.state.outcome
    }
}
