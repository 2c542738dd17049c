#![allow(dead_code)]

use async_trait::async_trait;
use oxigraph::model::Graph;
use parking_lot::Mutex;
use shacl_validator::catalog::{Catalog, GraphCollection, GraphDescription};
use shacl_validator::expansion::{ExpansionEngine, ExpansionLimits};
use shacl_validator::fetch::{FetchResult, GraphFetcher};
use shacl_validator::rdf::parse_graph;
use shacl_validator::shacl::NativeShaclEvaluator;
use shacl_validator::validator::ValidatorService;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const EX: &str = "http://example.org/";

pub fn ex(local: &str) -> String {
    format!("{EX}{local}")
}

pub fn turtle(text: &str) -> Graph {
    parse_graph(text, None, None).expect("test turtle parses")
}

/// What a [`MemoryFetcher`] answers for one URI
#[derive(Clone)]
pub enum Canned {
    Turtle(String),
    Status(u16),
    Transient,
    Garbage,
}

/// In-memory fetcher recording every call.
///
/// Unknown URIs answer 404.
#[derive(Default)]
pub struct MemoryFetcher {
    documents: HashMap<String, Canned>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<(String, bool)>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_turtle(mut self, uri: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents.insert(uri.into(), Canned::Turtle(text.into()));
        self
    }

    pub fn with(mut self, uri: impl Into<String>, canned: Canned) -> Self {
        self.documents.insert(uri.into(), canned);
        self
    }

    pub fn with_delay(mut self, uri: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(uri.into(), delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, uri: &str) -> usize {
        self.calls.lock().iter().filter(|(called, _)| called == uri).count()
    }
}

#[async_trait]
impl GraphFetcher for MemoryFetcher {
    async fn fetch(&self, uri: &str, use_cache: bool) -> FetchResult {
        self.calls.lock().push((uri.to_string(), use_cache));
        if let Some(delay) = self.delays.get(uri) {
            tokio::time::sleep(*delay).await;
        }
        match self.documents.get(uri) {
            Some(Canned::Turtle(text)) => match parse_graph(text, None, Some(uri)) {
                Ok(graph) => FetchResult::Success(graph),
                Err(e) => FetchResult::ParseError {
                    reason: e.to_string(),
                },
            },
            Some(Canned::Status(status)) => FetchResult::NotFound { status: *status },
            Some(Canned::Transient) => FetchResult::TransientError {
                reason: "connection reset".into(),
                attempts: 5,
            },
            Some(Canned::Garbage) => FetchResult::ParseError {
                reason: "no supported serialization matched".into(),
            },
            None => FetchResult::NotFound { status: 404 },
        }
    }
}

pub fn engine(fetcher: Arc<MemoryFetcher>) -> ExpansionEngine {
    ExpansionEngine::new(fetcher, ExpansionLimits::default())
}

/// Catalog whose documents live on example.org
pub fn test_catalog() -> Catalog {
    let description = |id: &str, url: String| GraphDescription {
        id: id.into(),
        name: format!("test graph {id}"),
        description: None,
        version: "1".into(),
        url,
        specification_name: None,
        specification_version: None,
        specification_url: None,
    };
    Catalog::new(
        GraphCollection::new([description("1", ex("catalog/shapes.ttl"))]),
        GraphCollection::new([description("1", ex("catalog/ontology.ttl"))]),
    )
}

pub fn validator(fetcher: Arc<MemoryFetcher>) -> ValidatorService {
    ValidatorService::new(
        fetcher.clone(),
        Arc::new(NativeShaclEvaluator::new()),
        engine(fetcher),
        Arc::new(test_catalog()),
    )
}

pub const DATASET_SHAPES: &str = r#"
    @prefix sh: <http://www.w3.org/ns/shacl#> .
    @prefix dcat: <http://www.w3.org/ns/dcat#> .
    @prefix dct: <http://purl.org/dc/terms/> .

    <http://example.org/DatasetShape> a sh:NodeShape ;
        sh:targetClass dcat:Dataset ;
        sh:property [ sh:path dct:title ; sh:minCount 1 ] .
"#;

pub const CONFORMING_DATASET: &str = r#"
    @prefix dcat: <http://www.w3.org/ns/dcat#> .
    @prefix dct: <http://purl.org/dc/terms/> .
    <http://example.org/ds> a dcat:Dataset ;
        dct:title "A dataset" .
"#;
