//! RDF primitives: vocabulary, serializations, parsing and graph set operations.

pub mod format;
pub mod graph;
pub mod vocab;

pub use format::{RdfSerialization, negotiate};
pub use graph::{
    GraphParseError, SerializeError, has_subject, import_count, merge_into, parse_graph,
    referenced_object_iris, serialize_graph, take_imports,
};
