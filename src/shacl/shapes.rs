//! Shape discovery and loading from a shapes graph.

use super::EvaluatorError;
use super::nav::{self, instances_of, object, objects, rdf_list, subjects};
use super::report::Severity;
use crate::rdf::vocab::{owl, sh};
use indexmap::IndexSet;
use oxigraph::model::vocab::{rdf, rdfs};
use oxigraph::model::{Graph, Literal, NamedNode, NamedNodeRef, Term};
use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Property paths the evaluator understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Path {
    Predicate(NamedNode),
    Inverse(NamedNode),
}

impl Path {
    /// Value nodes reached from `focus`.
    pub fn values(&self, graph: &Graph, focus: &Term) -> Vec<Term> {
        match self {
            Path::Predicate(predicate) => objects(graph, focus, predicate.as_ref()),
            Path::Inverse(predicate) => subjects(graph, predicate.as_ref(), focus),
        }
    }

    /// Stable ordering key: forward paths first, then by predicate IRI.
    fn sort_key(&self) -> (bool, &str) {
        match self {
            Path::Predicate(predicate) => (false, predicate.as_str()),
            Path::Inverse(predicate) => (true, predicate.as_str()),
        }
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Path::Predicate(predicate) => write!(f, "{predicate}"),
            Path::Inverse(predicate) => write!(f, "^{predicate}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Iri,
    BlankNode,
    Literal,
    BlankNodeOrIri,
    BlankNodeOrLiteral,
    IriOrLiteral,
}

impl NodeKind {
    pub fn from_iri(iri: NamedNodeRef<'_>) -> Option<Self> {
        [
            (sh::IRI, NodeKind::Iri),
            (sh::BLANK_NODE, NodeKind::BlankNode),
            (sh::LITERAL, NodeKind::Literal),
            (sh::BLANK_NODE_OR_IRI, NodeKind::BlankNodeOrIri),
            (sh::BLANK_NODE_OR_LITERAL, NodeKind::BlankNodeOrLiteral),
            (sh::IRI_OR_LITERAL, NodeKind::IriOrLiteral),
        ]
        .into_iter()
        .find_map(|(candidate, kind)| (candidate == iri).then_some(kind))
    }

    pub fn matches(self, term: &Term) -> bool {
        match term {
            Term::NamedNode(_) => matches!(
                self,
                NodeKind::Iri | NodeKind::BlankNodeOrIri | NodeKind::IriOrLiteral
            ),
            Term::BlankNode(_) => matches!(
                self,
                NodeKind::BlankNode | NodeKind::BlankNodeOrIri | NodeKind::BlankNodeOrLiteral
            ),
            Term::Literal(_) => matches!(
                self,
                NodeKind::Literal | NodeKind::BlankNodeOrLiteral | NodeKind::IriOrLiteral
            ),
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }
}

/// Compiled `sh:pattern` with its `sh:flags`
#[derive(Debug, Clone)]
pub struct Pattern {
    pub source: String,
    regex: Regex,
}

impl Pattern {
    pub fn compile(source: &str, flags: Option<&str>) -> Result<Self, regex::Error> {
        let flags = flags.unwrap_or_default();
        let regex = RegexBuilder::new(source)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .ignore_whitespace(flags.contains('x'))
            .build()?;
        Ok(Self {
            source: source.to_owned(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Constraint parameters declared on one shape.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    pub min_count: Option<usize>,
    pub max_count: Option<usize>,
    pub datatype: Option<NamedNode>,
    pub classes: Vec<Term>,
    pub node_kind: Option<NodeKind>,
    pub pattern: Option<Pattern>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<Literal>,
    pub max_inclusive: Option<Literal>,
    pub min_exclusive: Option<Literal>,
    pub max_exclusive: Option<Literal>,
    pub in_values: Option<Vec<Term>>,
    pub has_value: Vec<Term>,
    pub unique_lang: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Targets {
    pub classes: Vec<Term>,
    pub nodes: Vec<Term>,
    pub subjects_of: Vec<NamedNode>,
    pub objects_of: Vec<NamedNode>,
}

impl Targets {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.nodes.is_empty()
            && self.subjects_of.is_empty()
            && self.objects_of.is_empty()
    }

    /// Focus nodes selected in `data`, without duplicates.
    pub fn focus_nodes(&self, data: &Graph) -> IndexSet<Term> {
        let mut focus = IndexSet::new();
        focus.extend(self.nodes.iter().cloned());
        for class in &self.classes {
            focus.extend(instances_of(data, class));
        }
        for predicate in &self.subjects_of {
            focus.extend(
                data.triples_for_predicate(predicate.as_ref())
                    .map(|triple| Term::from(triple.subject.into_owned())),
            );
        }
        for predicate in &self.objects_of {
            focus.extend(
                data.triples_for_predicate(predicate.as_ref())
                    .map(|triple| triple.object.into_owned()),
            );
        }
        focus
    }
}

/// A node shape, or a property shape when `path` is set.
#[derive(Debug, Clone)]
pub struct Shape {
    pub id: Term,
    pub path: Option<Path>,
    pub targets: Targets,
    pub constraints: Constraints,
    /// Property shapes reached through `sh:property`
    pub properties: Vec<Shape>,
    pub severity: Severity,
    pub message: Option<String>,
    pub deactivated: bool,
}

const TARGET_PREDICATES: [NamedNodeRef<'static>; 4] = [
    sh::TARGET_CLASS,
    sh::TARGET_NODE,
    sh::TARGET_SUBJECTS_OF,
    sh::TARGET_OBJECTS_OF,
];

/// Loads every top-level shape: typed node or property shapes, and anything
/// carrying a target declaration.
pub fn load_shapes(shapes: &Graph) -> Result<Vec<Shape>, EvaluatorError> {
    let mut ids: IndexSet<Term> = IndexSet::new();
    for kind in [sh::NODE_SHAPE, sh::PROPERTY_SHAPE] {
        ids.extend(subjects_of_type(shapes, kind));
    }
    for predicate in TARGET_PREDICATES {
        ids.extend(
            shapes
                .triples_for_predicate(predicate)
                .map(|triple| Term::from(triple.subject.into_owned())),
        );
    }

    let loader = ShapeLoader { graph: shapes };
    let mut loaded = Vec::with_capacity(ids.len());
    for id in ids {
        match loader.load(&id, true)? {
            Some(shape) => loaded.push(shape),
            None => debug!(shape = %id, "skipping shape with unsupported path"),
        }
    }
    Ok(loaded)
}

fn subjects_of_type(graph: &Graph, class: NamedNodeRef<'_>) -> Vec<Term> {
    subjects(graph, rdf::TYPE, &Term::NamedNode(class.into_owned()))
}

struct ShapeLoader<'a> {
    graph: &'a Graph,
}

impl ShapeLoader<'_> {
    /// `None` when the shape declares a path the evaluator cannot follow.
    fn load(&self, id: &Term, top_level: bool) -> Result<Option<Shape>, EvaluatorError> {
        let path = match object(self.graph, id, sh::PATH) {
            None => None,
            Some(path) => match self.path(&path) {
                Some(path) => Some(path),
                None => return Ok(None),
            },
        };

        let mut properties = Vec::new();
        if top_level && path.is_none() {
            for property in objects(self.graph, id, sh::PROPERTY) {
                match self.load(&property, false)? {
                    Some(shape) if shape.path.is_some() => properties.push(shape),
                    _ => debug!(shape = %id, property = %property, "skipping property shape"),
                }
            }
            // Property shapes are usually blank nodes, renamed on every parse
            properties.sort_by(|a, b| {
                a.path
                    .as_ref()
                    .map(Path::sort_key)
                    .cmp(&b.path.as_ref().map(Path::sort_key))
            });
        }

        Ok(Some(Shape {
            id: id.clone(),
            path,
            targets: if top_level { self.targets(id) } else { Targets::default() },
            constraints: self.constraints(id)?,
            properties,
            severity: self
                .named(id, sh::SEVERITY)
                .map(|iri| Severity::from_iri(iri.as_ref()))
                .unwrap_or(Severity::Violation),
            message: self.literal(id, sh::MESSAGE).map(|message| message.value().to_owned()),
            deactivated: self
                .literal(id, sh::DEACTIVATED)
                .is_some_and(|flag| flag.value() == "true" || flag.value() == "1"),
        }))
    }

    fn path(&self, path: &Term) -> Option<Path> {
        match path {
            Term::NamedNode(predicate) => Some(Path::Predicate(predicate.clone())),
            Term::BlankNode(_) => match object(self.graph, path, sh::INVERSE_PATH) {
                Some(Term::NamedNode(predicate)) => Some(Path::Inverse(predicate)),
                _ => None,
            },
            _ => None,
        }
    }

    fn targets(&self, id: &Term) -> Targets {
        let mut targets = Targets {
            classes: objects(self.graph, id, sh::TARGET_CLASS),
            nodes: objects(self.graph, id, sh::TARGET_NODE),
            subjects_of: self.named_all(id, sh::TARGET_SUBJECTS_OF),
            objects_of: self.named_all(id, sh::TARGET_OBJECTS_OF),
        };
        // A shape that is also a class targets its own instances
        let is_class = [rdfs::CLASS, owl::CLASS].into_iter().any(|class| {
            nav::is_instance_of(self.graph, id, &Term::NamedNode(class.into_owned()))
        });
        if is_class && !targets.classes.contains(id) {
            targets.classes.push(id.clone());
        }
        targets
    }

    fn constraints(&self, id: &Term) -> Result<Constraints, EvaluatorError> {
        let pattern = match self.literal(id, sh::PATTERN) {
            Some(source) => {
                let flags = self.literal(id, sh::FLAGS);
                let compiled = Pattern::compile(source.value(), flags.as_ref().map(Literal::value))
                    .map_err(|error| invalid(id, format!("sh:pattern: {error}")))?;
                Some(compiled)
            }
            None => None,
        };

        Ok(Constraints {
            min_count: self.count(id, sh::MIN_COUNT)?,
            max_count: self.count(id, sh::MAX_COUNT)?,
            datatype: self.named(id, sh::DATATYPE),
            classes: objects(self.graph, id, sh::CLASS),
            node_kind: self
                .named(id, sh::NODE_KIND)
                .and_then(|kind| NodeKind::from_iri(kind.as_ref())),
            pattern,
            min_length: self.count(id, sh::MIN_LENGTH)?,
            max_length: self.count(id, sh::MAX_LENGTH)?,
            min_inclusive: self.literal(id, sh::MIN_INCLUSIVE),
            max_inclusive: self.literal(id, sh::MAX_INCLUSIVE),
            min_exclusive: self.literal(id, sh::MIN_EXCLUSIVE),
            max_exclusive: self.literal(id, sh::MAX_EXCLUSIVE),
            in_values: object(self.graph, id, sh::IN).map(|head| rdf_list(self.graph, &head)),
            has_value: objects(self.graph, id, sh::HAS_VALUE),
            unique_lang: self
                .literal(id, sh::UNIQUE_LANG)
                .is_some_and(|flag| flag.value() == "true" || flag.value() == "1"),
        })
    }

    fn literal(&self, id: &Term, predicate: NamedNodeRef<'_>) -> Option<Literal> {
        objects(self.graph, id, predicate)
            .into_iter()
            .find_map(|term| match term {
                Term::Literal(literal) => Some(literal),
                _ => None,
            })
    }

    fn named(&self, id: &Term, predicate: NamedNodeRef<'_>) -> Option<NamedNode> {
        self.named_all(id, predicate).into_iter().next()
    }

    fn named_all(&self, id: &Term, predicate: NamedNodeRef<'_>) -> Vec<NamedNode> {
        objects(self.graph, id, predicate)
            .into_iter()
            .filter_map(|term| match term {
                Term::NamedNode(node) => Some(node),
                _ => None,
            })
            .collect()
    }

    fn count(&self, id: &Term, predicate: NamedNodeRef<'_>) -> Result<Option<usize>, EvaluatorError> {
        self.literal(id, predicate)
            .map(|literal| {
                literal.value().trim().parse::<usize>().map_err(|_| {
                    invalid(
                        id,
                        format!("{predicate} expects a non-negative integer, got {}", literal.value()),
                    )
                })
            })
            .transpose()
    }
}

fn invalid(id: &Term, reason: String) -> EvaluatorError {
    EvaluatorError::InvalidShape {
        shape: id.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::parse_graph;
    use assert_matches::assert_matches;

    const SHAPES: &str = r#"
        @prefix sh: <http://www.w3.org/ns/shacl#> .
        @prefix ex: <http://example.org/> .
        @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
        @prefix dct: <http://purl.org/dc/terms/> .

        ex:DatasetShape a sh:NodeShape ;
            sh:targetClass ex:Dataset ;
            sh:property [
                sh:path dct:title ;
                sh:minCount 1 ;
                sh:datatype xsd:string ;
                sh:severity sh:Warning
            ] , [
                sh:path [ sh:inversePath ex:dataset ] ;
                sh:maxCount 1
            ] , [
                sh:path ( dct:a dct:b ) ;
                sh:minCount 1
            ] .

        ex:PublisherShape sh:targetSubjectsOf dct:publisher ;
            sh:nodeKind sh:IRI ;
            sh:deactivated true .
    "#;

    #[test]
    fn property_order_does_not_depend_on_blank_node_labels() {
        let shapes = r#"
            @prefix sh: <http://www.w3.org/ns/shacl#> .
            <http://example.org/S> a sh:NodeShape ;
                sh:targetNode <http://example.org/n> ;
                sh:property [ sh:path <http://example.org/z> ; sh:minCount 1 ] ,
                            [ sh:path [ sh:inversePath <http://example.org/a> ] ; sh:maxCount 1 ] ,
                            [ sh:path <http://example.org/m> ; sh:minCount 1 ] ,
                            [ sh:path <http://example.org/b> ; sh:minCount 1 ] .
        "#;
        for _ in 0..20 {
            let graph = parse_graph(shapes, None, None).unwrap();
            let loaded = load_shapes(&graph).unwrap();
            let paths: Vec<String> = loaded[0]
                .properties
                .iter()
                .filter_map(|p| p.path.as_ref().map(ToString::to_string))
                .collect();
            assert_eq!(
                paths,
                [
                    "<http://example.org/b>",
                    "<http://example.org/m>",
                    "<http://example.org/z>",
                    "^<http://example.org/a>",
                ]
            );
        }
    }

    #[test]
    fn loads_targets_and_properties() {
        let graph = parse_graph(SHAPES, None, None).unwrap();
        let shapes = load_shapes(&graph).unwrap();
        assert_eq!(shapes.len(), 2);

        let dataset = &shapes[0];
        assert_eq!(dataset.targets.classes.len(), 1);
        // the sequence path is skipped
        assert_eq!(dataset.properties.len(), 2);

        let title = dataset
            .properties
            .iter()
            .find(|p| matches!(&p.path, Some(Path::Predicate(_))))
            .unwrap();
        assert_eq!(title.constraints.min_count, Some(1));
        assert_eq!(title.severity, Severity::Warning);
        assert_matches!(&title.path, Some(Path::Predicate(p)) if p.as_str() == "http://purl.org/dc/terms/title");
        assert_matches!(&dataset.properties[1].path, Some(Path::Inverse(_)));

        let publisher = &shapes[1];
        assert!(publisher.deactivated);
        assert_eq!(publisher.constraints.node_kind, Some(NodeKind::Iri));
        assert_eq!(publisher.targets.subjects_of.len(), 1);
    }

    #[test]
    fn invalid_count_is_a_shape_error() {
        let graph = parse_graph(
            r#"
            @prefix sh: <http://www.w3.org/ns/shacl#> .
            <http://example.org/S> a sh:NodeShape ;
                sh:property [ sh:path <http://example.org/p> ; sh:minCount "many" ] .
            "#,
            None,
            None,
        )
        .unwrap();
        assert_matches!(load_shapes(&graph), Err(EvaluatorError::InvalidShape { .. }));
    }

    #[test]
    fn pattern_flags_are_applied() {
        let pattern = Pattern::compile("^abc$", Some("i")).unwrap();
        assert!(pattern.is_match("ABC"));
        assert!(Pattern::compile("(", None).is_err());
    }

    #[test]
    fn class_shapes_target_their_instances() {
        let graph = parse_graph(
            r#"
            @prefix sh: <http://www.w3.org/ns/shacl#> .
            @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
            <http://example.org/Person> a rdfs:Class, sh:NodeShape .
            "#,
            None,
            None,
        )
        .unwrap();
        let shapes = load_shapes(&graph).unwrap();
        assert_eq!(shapes[0].targets.classes, vec![shapes[0].id.clone()]);
    }
}
