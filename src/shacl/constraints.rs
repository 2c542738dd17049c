//! Constraint checking against a (possibly inferred) data graph.

use super::nav::is_instance_of;
use super::report::{ConstraintComponent, ValidationResult};
use super::shapes::{Constraints, Shape};
use oxigraph::model::vocab::xsd;
use oxigraph::model::{Graph, Literal, NamedNodeRef, Term};
use std::cmp::Ordering;
use std::collections::HashMap;

pub struct ConstraintChecker<'a> {
    data: &'a Graph,
}

impl<'a> ConstraintChecker<'a> {
    pub fn new(data: &'a Graph) -> Self {
        Self { data }
    }

    /// Validates every focus node selected by the shape's targets.
    pub fn check_shape(&self, shape: &Shape) -> Vec<ValidationResult> {
        if shape.deactivated || shape.targets.is_empty() {
            return Vec::new();
        }
        shape
            .targets
            .focus_nodes(self.data)
            .iter()
            .flat_map(|focus| self.check_focus(shape, focus))
            .collect()
    }

    /// Validates one focus node against a node or property shape.
    pub fn check_focus(&self, shape: &Shape, focus: &Term) -> Vec<ValidationResult> {
        let mut results = Vec::new();
        if shape.deactivated {
            return results;
        }

        match &shape.path {
            None => {
                let focus_only = std::slice::from_ref(focus);
                self.check_values(shape, focus, focus_only, &mut results);
                for value in &shape.constraints.has_value {
                    if value != focus {
                        results.push(self.result(
                            shape,
                            focus,
                            Some(focus),
                            ConstraintComponent::HasValue,
                            format!("Node is not {value}"),
                        ));
                    }
                }
                for property in &shape.properties {
                    results.extend(self.check_focus(property, focus));
                }
            }
            Some(path) => {
                let values = path.values(self.data, focus);
                self.check_cardinality(shape, focus, values.len(), &mut results);
                self.check_values(shape, focus, &values, &mut results);
                for expected in &shape.constraints.has_value {
                    if !values.contains(expected) {
                        results.push(self.result(
                            shape,
                            focus,
                            None,
                            ConstraintComponent::HasValue,
                            format!("Missing expected value {expected}"),
                        ));
                    }
                }
                if shape.constraints.unique_lang {
                    self.check_unique_lang(shape, focus, &values, &mut results);
                }
            }
        }
        results
    }

    fn check_cardinality(
        &self,
        shape: &Shape,
        focus: &Term,
        count: usize,
        results: &mut Vec<ValidationResult>,
    ) {
        let constraints = &shape.constraints;
        if let Some(min) = constraints.min_count.filter(|min| count < *min) {
            results.push(self.result(
                shape,
                focus,
                None,
                ConstraintComponent::MinCount,
                format!("Less than {min} values"),
            ));
        }
        if let Some(max) = constraints.max_count.filter(|max| count > *max) {
            results.push(self.result(
                shape,
                focus,
                None,
                ConstraintComponent::MaxCount,
                format!("More than {max} values"),
            ));
        }
    }

    /// Value-type, string, range and enumeration constraints, per value node.
    fn check_values(
        &self,
        shape: &Shape,
        focus: &Term,
        values: &[Term],
        results: &mut Vec<ValidationResult>,
    ) {
        let constraints = &shape.constraints;
        for value in values {
            for (component, message) in self.violations(constraints, value) {
                results.push(self.result(shape, focus, Some(value), component, message));
            }
        }
    }

    fn violations(&self, constraints: &Constraints, value: &Term) -> Vec<(ConstraintComponent, String)> {
        let mut found = Vec::new();

        if let Some(datatype) = &constraints.datatype {
            let valid = match value {
                Term::Literal(literal) => {
                    literal.datatype() == datatype.as_ref() && is_well_formed(literal)
                }
                _ => false,
            };
            if !valid {
                found.push((
                    ConstraintComponent::Datatype,
                    format!("Value is not Literal with datatype {datatype}"),
                ));
            }
        }

        for class in &constraints.classes {
            if !is_instance_of(self.data, value, class) {
                found.push((
                    ConstraintComponent::Class,
                    format!("Value does not have class {class}"),
                ));
            }
        }

        if let Some(kind) = constraints.node_kind {
            if !kind.matches(value) {
                found.push((
                    ConstraintComponent::NodeKind,
                    format!("Value is not of Node Kind {kind:?}"),
                ));
            }
        }

        let text = lexical_form(value);
        if let Some(pattern) = &constraints.pattern {
            if !text.is_some_and(|text| pattern.is_match(text)) {
                found.push((
                    ConstraintComponent::Pattern,
                    format!("Value does not match pattern \"{}\"", pattern.source),
                ));
            }
        }
        let length = text.map(|text| text.chars().count());
        if let Some(min) = constraints.min_length {
            if !length.is_some_and(|length| length >= min) {
                found.push((
                    ConstraintComponent::MinLength,
                    format!("String length not >= {min}"),
                ));
            }
        }
        if let Some(max) = constraints.max_length {
            if !length.is_some_and(|length| length <= max) {
                found.push((
                    ConstraintComponent::MaxLength,
                    format!("String length not <= {max}"),
                ));
            }
        }

        let ranges = [
            (&constraints.min_inclusive, ConstraintComponent::MinInclusive, ">=", &[Ordering::Greater, Ordering::Equal][..]),
            (&constraints.max_inclusive, ConstraintComponent::MaxInclusive, "<=", &[Ordering::Less, Ordering::Equal][..]),
            (&constraints.min_exclusive, ConstraintComponent::MinExclusive, ">", &[Ordering::Greater][..]),
            (&constraints.max_exclusive, ConstraintComponent::MaxExclusive, "<", &[Ordering::Less][..]),
        ];
        for (bound, component, operator, accepted) in ranges {
            let Some(bound) = bound else {
                continue;
            };
            let ordering = compare(value, bound);
            if !ordering.is_some_and(|ordering| accepted.contains(&ordering)) {
                found.push((component, format!("Value is not {operator} {}", bound.value())));
            }
        }

        if let Some(allowed) = &constraints.in_values {
            if !allowed.contains(value) {
                found.push((
                    ConstraintComponent::In,
                    format!("Value is not in {}", join(allowed)),
                ));
            }
        }

        found
    }

    fn check_unique_lang(
        &self,
        shape: &Shape,
        focus: &Term,
        values: &[Term],
        results: &mut Vec<ValidationResult>,
    ) {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for value in values {
            if let Term::Literal(literal) = value {
                if let Some(language) = literal.language() {
                    *seen.entry(language).or_default() += 1;
                }
            }
        }
        let mut duplicated: Vec<&str> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(language, _)| language)
            .collect();
        duplicated.sort_unstable();
        for language in duplicated {
            results.push(self.result(
                shape,
                focus,
                None,
                ConstraintComponent::UniqueLang,
                format!("Language \"{language}\" is used by more than one value"),
            ));
        }
    }

    fn result(
        &self,
        shape: &Shape,
        focus: &Term,
        value: Option<&Term>,
        component: ConstraintComponent,
        default_message: String,
    ) -> ValidationResult {
        ValidationResult {
            focus_node: focus.clone(),
            result_path: shape.path.clone(),
            value: value.cloned(),
            message: shape.message.clone().unwrap_or(default_message),
            severity: shape.severity,
            source_shape: shape.id.clone(),
            component,
        }
    }
}

/// String used by `sh:pattern` and the length constraints; blank nodes have none.
fn lexical_form(term: &Term) -> Option<&str> {
    match term {
        Term::NamedNode(node) => Some(node.as_str()),
        Term::Literal(literal) => Some(literal.value()),
        _ => None,
    }
}

const INTEGER_TYPES: [NamedNodeRef<'static>; 12] = [
    xsd::INTEGER,
    xsd::INT,
    xsd::LONG,
    xsd::SHORT,
    xsd::BYTE,
    xsd::NON_NEGATIVE_INTEGER,
    xsd::NON_POSITIVE_INTEGER,
    xsd::POSITIVE_INTEGER,
    xsd::NEGATIVE_INTEGER,
    xsd::UNSIGNED_INT,
    xsd::UNSIGNED_LONG,
    xsd::UNSIGNED_SHORT,
];

/// Lexical check for the datatypes whose ill-formed values show up in practice.
fn is_well_formed(literal: &Literal) -> bool {
    let datatype = literal.datatype();
    let value = literal.value();
    if INTEGER_TYPES.iter().any(|candidate| *candidate == datatype) {
        value.parse::<i128>().is_ok()
    } else if datatype == xsd::DECIMAL {
        !value.contains(['e', 'E']) && value.parse::<f64>().is_ok()
    } else if datatype == xsd::DOUBLE || datatype == xsd::FLOAT {
        matches!(value, "INF" | "-INF" | "NaN") || value.parse::<f64>().is_ok()
    } else if datatype == xsd::BOOLEAN {
        matches!(value, "true" | "false" | "1" | "0")
    } else {
        true
    }
}

/// Orders `value` relative to `bound`.
///
/// Numbers compare numerically; other literals of the bound's datatype compare
/// lexically, which orders ISO dates correctly. Anything else is incomparable.
fn compare(value: &Term, bound: &Literal) -> Option<Ordering> {
    let Term::Literal(value) = value else {
        return None;
    };
    if let (Ok(left), Ok(right)) = (value.value().parse::<f64>(), bound.value().parse::<f64>()) {
        return left.partial_cmp(&right);
    }
    (value.datatype() == bound.datatype()).then(|| value.value().cmp(bound.value()))
}

fn join(terms: &[Term]) -> String {
    terms
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shacl::shapes::{Path, load_shapes};
    use crate::rdf::parse_graph;

    const SHAPES: &str = r#"
        @prefix sh: <http://www.w3.org/ns/shacl#> .
        @prefix ex: <http://example.org/> .
        @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .

        ex:ThingShape a sh:NodeShape ;
            sh:targetClass ex:Thing ;
            sh:property [ sh:path ex:name ; sh:minCount 1 ; sh:maxCount 1 ] ;
            sh:property [ sh:path ex:age ; sh:datatype xsd:integer ; sh:minInclusive 0 ; sh:maxExclusive 150 ] ;
            sh:property [ sh:path ex:code ; sh:pattern "^[A-Z]{3}$" ; sh:maxLength 3 ] ;
            sh:property [ sh:path ex:status ; sh:in ( ex:active ex:retired ) ] ;
            sh:property [ sh:path ex:label ; sh:uniqueLang true ] ;
            sh:property [ sh:path ex:owner ; sh:class ex:Agent ; sh:nodeKind sh:IRI ] ;
            sh:property [ sh:path [ sh:inversePath ex:contains ] ; sh:minCount 1 ;
                          sh:message "Thing must belong to a container" ] .
    "#;

    fn check(data: &str) -> Vec<ValidationResult> {
        let shapes = load_shapes(&parse_graph(SHAPES, None, None).unwrap()).unwrap();
        let data = parse_graph(data, None, None).unwrap();
        let checker = ConstraintChecker::new(&data);
        shapes.iter().flat_map(|shape| checker.check_shape(shape)).collect()
    }

    fn components(results: &[ValidationResult]) -> Vec<ConstraintComponent> {
        let mut components: Vec<_> = results.iter().map(|result| result.component).collect();
        components.sort_by_key(|component| component.to_string());
        components
    }

    #[test]
    fn conforming_node_has_no_results() {
        let results = check(
            r#"
            @prefix ex: <http://example.org/> .
            ex:box ex:contains ex:t .
            ex:org a ex:Agent .
            ex:t a ex:Thing ; ex:name "T" ; ex:age 42 ; ex:code "ABC" ;
                 ex:status ex:active ; ex:label "a"@en, "b"@nb ; ex:owner ex:org .
            "#,
        );
        assert!(results.is_empty(), "{results:?}");
    }

    #[test]
    fn reports_each_violated_component() {
        let results = check(
            r#"
            @prefix ex: <http://example.org/> .
            @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
            ex:t a ex:Thing ; ex:name "A", "B" ; ex:age "old"^^xsd:integer, 200 ;
                 ex:code "abcd" ; ex:status ex:unknown ; ex:label "a"@en, "b"@en ;
                 ex:owner "someone" .
            "#,
        );
        let found = components(&results);
        for expected in [
            ConstraintComponent::MaxCount,
            ConstraintComponent::Datatype,
            ConstraintComponent::MaxExclusive,
            ConstraintComponent::Pattern,
            ConstraintComponent::MaxLength,
            ConstraintComponent::In,
            ConstraintComponent::UniqueLang,
            ConstraintComponent::Class,
            ConstraintComponent::NodeKind,
            ConstraintComponent::MinCount,
        ] {
            assert!(found.contains(&expected), "missing {expected}: {found:?}");
        }
    }

    #[test]
    fn custom_message_and_inverse_path() {
        let results = check(
            r#"
            @prefix ex: <http://example.org/> .
            ex:t a ex:Thing ; ex:name "T" .
            "#,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "Thing must belong to a container");
        assert!(matches!(results[0].result_path, Some(Path::Inverse(_))));
        assert_eq!(results[0].component, ConstraintComponent::MinCount);
    }

    #[test]
    fn numeric_and_date_comparison() {
        let ten = Literal::new_typed_literal("10", xsd::INTEGER);
        let nine: Term = Literal::new_typed_literal("9.5", xsd::DECIMAL).into();
        assert_eq!(compare(&nine, &ten), Some(Ordering::Less));

        let bound = Literal::new_typed_literal("2020-01-01", xsd::DATE);
        let later: Term = Literal::new_typed_literal("2021-06-30", xsd::DATE).into();
        assert_eq!(compare(&later, &bound), Some(Ordering::Greater));

        let text: Term = Literal::new_simple_literal("abc").into();
        assert_eq!(compare(&text, &ten), None);
    }
}
