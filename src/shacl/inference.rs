//! RDFS entailment used before constraint checking.
//!
//! Covers rdfs2 (domain), rdfs3 (range), rdfs5/rdfs7 (subPropertyOf) and
//! rdfs9/rdfs11 (subClassOf), applied until no new triple appears.

use super::nav::triple;
use oxigraph::model::vocab::{rdf, rdfs};
use oxigraph::model::{Graph, NamedNode, NamedNodeRef, Term, TermRef, Triple};
use std::collections::HashMap;
use tracing::trace;

/// Adds the RDFS closure of `graph` to it; returns the number of inferred triples.
pub fn rdfs_closure(graph: &mut Graph) -> usize {
    let mut added = 0;
    let mut pass = 0;
    loop {
        pass += 1;
        let inferred = infer_once(graph);
        let fresh = inferred.iter().filter(|candidate| graph.insert(*candidate)).count();
        trace!(pass, fresh, "rdfs pass");
        if fresh == 0 {
            break;
        }
        added += fresh;
    }
    added
}

struct Schema {
    /// Keyed by class term, which may be a blank node
    sub_class: HashMap<Term, Vec<Term>>,
    /// Property-keyed maps use the IRI string so predicates can be looked up
    /// without allocating
    sub_property: HashMap<String, Vec<Term>>,
    domain: HashMap<String, Vec<Term>>,
    range: HashMap<String, Vec<Term>>,
}

impl Schema {
    fn read(graph: &Graph) -> Self {
        let mut sub_class: HashMap<Term, Vec<Term>> = HashMap::new();
        for statement in graph.triples_for_predicate(rdfs::SUB_CLASS_OF) {
            sub_class
                .entry(Term::from(statement.subject.into_owned()))
                .or_default()
                .push(statement.object.into_owned());
        }
        Self {
            sub_class,
            sub_property: by_property(graph, rdfs::SUB_PROPERTY_OF),
            domain: by_property(graph, rdfs::DOMAIN),
            range: by_property(graph, rdfs::RANGE),
        }
    }
}

fn by_property(graph: &Graph, predicate: NamedNodeRef<'_>) -> HashMap<String, Vec<Term>> {
    let mut map: HashMap<String, Vec<Term>> = HashMap::new();
    for statement in graph.triples_for_predicate(predicate) {
        if let TermRef::NamedNode(property) = TermRef::from(statement.subject) {
            map.entry(property.as_str().to_owned())
                .or_default()
                .push(statement.object.into_owned());
        }
    }
    map
}

fn infer_once(graph: &Graph) -> Vec<Triple> {
    let schema = Schema::read(graph);
    let mut inferred = Vec::new();

    // rdfs11
    for (class, supers) in &schema.sub_class {
        for parent in supers {
            for grandparent in schema.sub_class.get(parent).into_iter().flatten() {
                inferred.extend(triple(class, rdfs::SUB_CLASS_OF, grandparent.clone()));
            }
        }
    }

    // rdfs5
    for (property, supers) in &schema.sub_property {
        let property = Term::NamedNode(NamedNode::new_unchecked(property.clone()));
        for parent in supers {
            let Term::NamedNode(parent) = parent else {
                continue;
            };
            for grandparent in schema.sub_property.get(parent.as_str()).into_iter().flatten() {
                inferred.extend(triple(&property, rdfs::SUB_PROPERTY_OF, grandparent.clone()));
            }
        }
    }

    for statement in graph.iter() {
        let predicate = statement.predicate.as_str();
        let subject = Term::from(statement.subject.into_owned());

        // rdfs2
        for class in schema.domain.get(predicate).into_iter().flatten() {
            inferred.extend(triple(&subject, rdf::TYPE, class.clone()));
        }

        // rdfs3
        if !matches!(statement.object, TermRef::Literal(_)) {
            let object = statement.object.into_owned();
            for class in schema.range.get(predicate).into_iter().flatten() {
                inferred.extend(triple(&object, rdf::TYPE, class.clone()));
            }
        }

        // rdfs7
        for parent in schema.sub_property.get(predicate).into_iter().flatten() {
            if let Term::NamedNode(parent) = parent {
                inferred.extend(triple(&subject, parent.as_ref(), statement.object.into_owned()));
            }
        }

        // rdfs9
        if statement.predicate == rdf::TYPE {
            let class = statement.object.into_owned();
            for parent in schema.sub_class.get(&class).into_iter().flatten() {
                inferred.extend(triple(&subject, rdf::TYPE, parent.clone()));
            }
        }
    }

    inferred
}
