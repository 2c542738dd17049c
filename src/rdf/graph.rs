//! Graph parsing, serialization and the set operations the expansion engine relies on.

use super::format::RdfSerialization;
use super::vocab::owl;
use indexmap::IndexSet;
use oxigraph::io::{RdfParser, RdfSerializer};
use oxigraph::model::vocab::rdf;
use oxigraph::model::{Graph, NamedNode, NamedNodeRef, Term, TermRef, Triple, TripleRef};
use std::io;
use thiserror::Error;
use tracing::trace;

const PREFIXES: &[(&str, &str)] = &[
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("sh", "http://www.w3.org/ns/shacl#"),
    ("dct", "http://purl.org/dc/terms/"),
    ("dcat", "http://www.w3.org/ns/dcat#"),
];

/// Text that did not parse under any supported serialization.
#[derive(Debug, Clone, Error)]
#[error("bad syntax in graph, tried {tried}: {reason}")]
pub struct GraphParseError {
    /// Media types attempted, in order.
    pub tried: String,
    /// Parser message from the last attempt.
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("{0} cannot be serialized")]
    Unsupported(RdfSerialization),
    #[error("invalid prefix declaration: {0}")]
    Prefix(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Parses `text` into a graph.
///
/// The `hint` (usually the response `Content-Type`) is tried first, then every
/// format of [`RdfSerialization::PARSE_ORDER`] not tried yet. Blank nodes are
/// renamed so that graphs parsed from different documents never share one.
pub fn parse_graph(
    text: &str,
    hint: Option<RdfSerialization>,
    base_iri: Option<&str>,
) -> Result<Graph, GraphParseError> {
    let mut attempts: Vec<RdfSerialization> = Vec::with_capacity(4);
    if let Some(hint) = hint {
        attempts.push(hint);
    }
    for format in RdfSerialization::PARSE_ORDER {
        if !attempts.contains(&format) {
            attempts.push(format);
        }
    }

    let mut last_reason = String::from("no serialization attempted");
    for format in &attempts {
        match parse_as(text, *format, base_iri) {
            Ok(graph) => {
                trace!(format = %format, triples = graph.len(), "parsed graph");
                return Ok(graph);
            }
            Err(reason) => {
                trace!(format = %format, %reason, "serialization did not match");
                last_reason = reason;
            }
        }
    }

    Err(GraphParseError {
        tried: attempts
            .iter()
            .map(|format| format.media_type())
            .collect::<Vec<_>>()
            .join(", "),
        reason: last_reason,
    })
}

fn parse_as(
    text: &str,
    format: RdfSerialization,
    base_iri: Option<&str>,
) -> Result<Graph, String> {
    let rdf_format = format
        .rdf_format()
        .ok_or_else(|| format!("{format} is not supported by the parser"))?;

    // An unusable base only matters for documents with relative IRIs,
    // which then fail on their own.
    let parser = base_iri
        .and_then(|base| RdfParser::from_format(rdf_format).with_base_iri(base).ok())
        .unwrap_or_else(|| RdfParser::from_format(rdf_format))
        .rename_blank_nodes();

    let mut graph = Graph::new();
    for quad in parser.for_reader(text.as_bytes()) {
        let quad = quad.map_err(|e| e.to_string())?;
        graph.insert(&Triple::new(quad.subject, quad.predicate, quad.object));
    }
    Ok(graph)
}

/// Serializes `graph` with the common prefixes declared.
pub fn serialize_graph(graph: &Graph, format: RdfSerialization) -> Result<Vec<u8>, SerializeError> {
    let rdf_format = format
        .rdf_format()
        .ok_or(SerializeError::Unsupported(format))?;

    let mut serializer = RdfSerializer::from_format(rdf_format);
    for (prefix, iri) in PREFIXES {
        serializer = serializer
            .with_prefix(*prefix, *iri)
            .map_err(|e| SerializeError::Prefix(e.to_string()))?;
    }

    let mut writer = serializer.for_writer(Vec::new());
    for triple in graph.iter() {
        writer.serialize_triple(triple)?;
    }
    Ok(writer.finish()?)
}

/// Adds every triple of `source` to `target`, returning how many were new.
///
/// Set semantics make this idempotent and commutative.
pub fn merge_into(target: &mut Graph, source: &Graph) -> usize {
    source.iter().filter(|triple| target.insert(*triple)).count()
}

/// True when `iri` is the subject of at least one triple.
pub fn has_subject(graph: &Graph, iri: NamedNodeRef<'_>) -> bool {
    graph.triples_for_subject(iri).next().is_some()
}

/// IRIs used as objects of any predicate but `rdf:type`, without duplicates.
///
/// Literals and blank nodes are never dereferenced so they are left out.
pub fn referenced_object_iris(graph: &Graph) -> IndexSet<NamedNode> {
    graph
        .iter()
        .filter(|triple| triple.predicate != rdf::TYPE)
        .filter_map(|triple| match triple.object {
            TermRef::NamedNode(node) => Some(node.into_owned()),
            _ => None,
        })
        .collect()
}

/// Removes every `owl:imports` statement and returns the imported IRIs.
pub fn take_imports(graph: &mut Graph) -> IndexSet<NamedNode> {
    let statements: Vec<Triple> = graph
        .triples_for_predicate(owl::IMPORTS)
        .map(TripleRef::into_owned)
        .collect();

    let mut targets = IndexSet::with_capacity(statements.len());
    for statement in &statements {
        graph.remove(statement);
        if let Term::NamedNode(target) = &statement.object {
            targets.insert(target.clone());
        }
    }
    targets
}

/// Number of `owl:imports` statements left in the graph.
pub fn import_count(graph: &Graph) -> usize {
    graph.triples_for_predicate(owl::IMPORTS).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TURTLE: &str = r#"
        @prefix ex: <http://example.org/> .
        ex:alice ex:knows ex:bob ;
                 a ex:Person .
        ex:bob ex:name "Bob" .
    "#;

    const JSON_LD: &str = r#"{
        "@id": "http://example.org/alice",
        "http://example.org/knows": { "@id": "http://example.org/bob" }
    }"#;

    const RDF_XML: &str = r#"<?xml version="1.0"?>
        <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                 xmlns:ex="http://example.org/">
          <rdf:Description rdf:about="http://example.org/alice">
            <ex:knows rdf:resource="http://example.org/bob"/>
          </rdf:Description>
        </rdf:RDF>"#;

    fn node(iri: &str) -> NamedNode {
        NamedNode::new(iri).unwrap()
    }

    #[test]
    fn parses_turtle() {
        let graph = parse_graph(TURTLE, None, None).unwrap();
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn falls_back_to_json_ld_and_rdf_xml() {
        assert_eq!(parse_graph(JSON_LD, None, None).unwrap().len(), 1);
        assert_eq!(parse_graph(RDF_XML, None, None).unwrap().len(), 1);
    }

    #[test]
    fn wrong_hint_still_parses() {
        let graph = parse_graph(TURTLE, Some(RdfSerialization::RdfXml), None).unwrap();
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_graph("this is not { rdf", None, None).unwrap_err();
        assert!(err.tried.contains("text/turtle"));
        assert!(err.tried.contains("application/rdf+xml"));
    }

    #[test]
    fn empty_text_is_an_empty_graph() {
        assert!(parse_graph("", None, None).unwrap().is_empty());
    }

    #[test]
    fn relative_iris_resolve_against_base() {
        let graph = parse_graph(
            "<a> <b> <c> .",
            Some(RdfSerialization::Turtle),
            Some("http://example.org/doc"),
        )
        .unwrap();
        assert!(has_subject(&graph, node("http://example.org/a").as_ref()));
    }

    #[test]
    fn merge_is_idempotent() {
        let source = parse_graph(TURTLE, None, None).unwrap();
        let mut target = Graph::new();
        assert_eq!(merge_into(&mut target, &source), 3);
        assert_eq!(merge_into(&mut target, &source), 0);
        assert_eq!(target.len(), 3);
    }

    #[test]
    fn referenced_objects_skip_types_and_literals() {
        let graph = parse_graph(TURTLE, None, None).unwrap();
        let objects = referenced_object_iris(&graph);
        assert_eq!(objects.len(), 1);
        assert!(objects.contains(&node("http://example.org/bob")));
    }

    #[test]
    fn take_imports_strips_statements() {
        let mut graph = parse_graph(
            r#"
            @prefix owl: <http://www.w3.org/2002/07/owl#> .
            <http://example.org/onto> a owl:Ontology ;
                owl:imports <http://example.org/a>, <http://example.org/b> .
            "#,
            None,
            None,
        )
        .unwrap();

        let targets = take_imports(&mut graph);
        assert_eq!(targets.len(), 2);
        assert_eq!(import_count(&graph), 0);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn serializes_to_every_output_format() {
        let graph = parse_graph(TURTLE, None, None).unwrap();
        for format in [
            RdfSerialization::Turtle,
            RdfSerialization::NTriples,
            RdfSerialization::RdfXml,
        ] {
            let bytes = serialize_graph(&graph, format).unwrap();
            let text = String::from_utf8(bytes).unwrap();
            let reparsed = parse_graph(&text, Some(format), None).unwrap();
            assert_eq!(reparsed.len(), graph.len(), "{format}");
        }
    }
}
