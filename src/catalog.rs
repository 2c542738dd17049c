//! Built-in shapes and ontology catalog.
//!
//! The catalog is an ordinary value built once at startup and handed to the
//! orchestrator and the HTTP layer; tests substitute their own.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Metadata about a published shapes or ontology graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDescription {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification_url: Option<String>,
}

/// Ordered id → description lookup
#[derive(Debug, Clone, Default)]
pub struct GraphCollection {
    entries: IndexMap<String, GraphDescription>,
}

impl GraphCollection {
    pub fn new(descriptions: impl IntoIterator<Item = GraphDescription>) -> Self {
        Self {
            entries: descriptions
                .into_iter()
                .map(|description| (description.id.clone(), description))
                .collect(),
        }
    }

    pub fn get_all(&self) -> Vec<&GraphDescription> {
        self.entries.values().collect()
    }

    pub fn get_by_id(&self, id: &str) -> Option<&GraphDescription> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub shapes: GraphCollection,
    pub ontologies: GraphCollection,
}

const RAW: &str = "https://raw.githubusercontent.com/Informasjonsforvaltning";

fn constraints_of(profile: &str) -> String {
    format!("This document specifies the constraints on properties and classes expressed by {profile} in SHACL.")
}

/// Name, version and landing page of the published specification
type Specification<'a> = (&'a str, &'a str, &'a str);

fn entry(
    id: &str,
    name: &str,
    description: String,
    version: &str,
    path: &str,
    (spec_name, spec_version, spec_url): Specification<'_>,
) -> GraphDescription {
    GraphDescription {
        id: id.into(),
        name: name.into(),
        description: Some(description),
        version: version.into(),
        url: format!("{RAW}/{path}"),
        specification_name: Some(spec_name.into()),
        specification_version: Some(spec_version.into()),
        specification_url: Some(spec_url.into()),
    }
}

impl Catalog {
    pub fn new(shapes: GraphCollection, ontologies: GraphCollection) -> Self {
        Self { shapes, ontologies }
    }

    /// Application profile shapes published by Informasjonsforvaltning and
    /// the ontologies they rely on.
    pub fn builtin() -> Self {
        let shapes = GraphCollection::new([
            entry(
                "1",
                "The constraints of DCAT-AP-NO",
                constraints_of("DCAT-AP-NO"),
                "0.1",
                "dcat-ap-no/v1.1/shacl/dcat-ap_shacl_shapes_1.1.ttl",
                ("DCAT-AP-NO", "1.1", "https://data.norge.no/specification/dcat-ap-no/v1.1"),
            ),
            entry(
                "2",
                "The constraints of DCAT-AP-NO",
                constraints_of("DCAT-AP-NO"),
                "0.1",
                "dcat-ap-no/v2/shacl/DCAT-AP-NO-shacl_shapes_2.00.ttl",
                ("DCAT-AP-NO", "2.0", "https://data.norge.no/specification/dcat-ap-no/"),
            ),
            entry(
                "3",
                "The constraints of SKOS-AP-NO-Begrep",
                constraints_of("SKOS-AP-NO-Begrep"),
                "0.1",
                "skos-ap-no-begrep/develop/shacl/SKOS-AP-NO-Begrep-shape_shape_v1.ttl",
                (
                    "SKOS-AP-NO-Begrep",
                    "1.0",
                    "https://data.norge.no/specification/skos-ap-no-begrep/",
                ),
            ),
            entry(
                "4",
                "SHACL-rules for CPSV-AP-NO",
                "This document specifies the constraints on properties and classes in CPSV-AP-NO, expressed in SHACL."
                    .into(),
                "0.9.04",
                "cpsv-ap-no/develop/shacl/CPSV-AP-NO_shacl_shapes_v09xx.ttl",
                ("CPSV-AP-NO", "0.9", "https://informasjonsforvaltning.github.io/cpsv-ap-no/"),
            ),
        ]);
        let ontologies = GraphCollection::new([entry(
            "1",
            "The ontologies used by DCAT-AP-NO",
            "This document specifies the ontology information needed by the DCAT-AP-NO validator tool.".into(),
            "0.1",
            "dcat-ap-no/develop/shacl/ontologies.ttl",
            ("DCAT-AP-NO", "2.0", "https://data.norge.no/specification/dcat-ap-no/v2"),
        )]);
        Self { shapes, ontologies }
    }
}
