//! Graph navigation on owned terms.
//!
//! Shapes, focus nodes and values are carried around as owned [`Term`]s; these
//! helpers dispatch to the subject-typed lookups of [`Graph`].

use indexmap::IndexSet;
use oxigraph::model::vocab::{rdf, rdfs};
use oxigraph::model::{Graph, NamedNodeRef, Term, TermRef, Triple};
use std::collections::HashSet;

/// Objects of `(subject, predicate, ?)`.
pub fn objects(graph: &Graph, subject: &Term, predicate: NamedNodeRef<'_>) -> Vec<Term> {
    match subject {
        Term::NamedNode(node) => graph
            .objects_for_subject_predicate(node.as_ref(), predicate)
            .map(TermRef::into_owned)
            .collect(),
        Term::BlankNode(node) => graph
            .objects_for_subject_predicate(node.as_ref(), predicate)
            .map(TermRef::into_owned)
            .collect(),
        _ => Vec::new(),
    }
}

/// First object of `(subject, predicate, ?)`.
pub fn object(graph: &Graph, subject: &Term, predicate: NamedNodeRef<'_>) -> Option<Term> {
    objects(graph, subject, predicate).into_iter().next()
}

/// Subjects of `(?, predicate, object)`.
pub fn subjects(graph: &Graph, predicate: NamedNodeRef<'_>, object: &Term) -> Vec<Term> {
    graph
        .subjects_for_predicate_object(predicate, object.as_ref())
        .map(|subject| Term::from(subject.into_owned()))
        .collect()
}

/// Builds a triple from an owned subject term; `None` for literal subjects.
pub fn triple(subject: &Term, predicate: NamedNodeRef<'_>, object: impl Into<Term>) -> Option<Triple> {
    match subject {
        Term::NamedNode(node) => Some(Triple::new(node.clone(), predicate, object.into())),
        Term::BlankNode(node) => Some(Triple::new(node.clone(), predicate, object.into())),
        _ => None,
    }
}

/// `class` and every class declared a transitive `rdfs:subClassOf` it.
pub fn subclasses_of(graph: &Graph, class: &Term) -> IndexSet<Term> {
    let mut classes = IndexSet::new();
    let mut queue = vec![class.clone()];
    while let Some(current) = queue.pop() {
        if classes.insert(current.clone()) {
            queue.extend(subjects(graph, rdfs::SUB_CLASS_OF, &current));
        }
    }
    classes
}

/// Nodes typed `class` or one of its subclasses.
pub fn instances_of(graph: &Graph, class: &Term) -> IndexSet<Term> {
    subclasses_of(graph, class)
        .iter()
        .flat_map(|class| subjects(graph, rdf::TYPE, class))
        .collect()
}

/// True if `node` has `rdf:type` `class` directly or through `rdfs:subClassOf`.
pub fn is_instance_of(graph: &Graph, node: &Term, class: &Term) -> bool {
    let mut seen = HashSet::new();
    let mut queue = objects(graph, node, rdf::TYPE);
    while let Some(current) = queue.pop() {
        if &current == class {
            return true;
        }
        if seen.insert(current.clone()) {
            queue.extend(objects(graph, &current, rdfs::SUB_CLASS_OF));
        }
    }
    false
}

/// Members of the RDF list starting at `head`.
///
/// Stops at `rdf:nil`, at a malformed cell or when a cell repeats.
pub fn rdf_list(graph: &Graph, head: &Term) -> Vec<Term> {
    let mut members = Vec::new();
    let mut seen = HashSet::new();
    let mut current = head.clone();
    loop {
        if matches!(&current, Term::NamedNode(node) if node.as_ref() == rdf::NIL) {
            break;
        }
        if !seen.insert(current.clone()) {
            break;
        }
        if let Some(first) = object(graph, &current, rdf::FIRST) {
            members.push(first);
        }
        match object(graph, &current, rdf::REST) {
            Some(rest) => current = rest,
            None => break,
        }
    }
    members
}
