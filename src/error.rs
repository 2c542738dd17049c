//! Error taxonomy for validation requests
//!
//! Every fatal condition maps to a stable [`ErrorCode`] so callers can tell
//! an unparsable shapes graph from an unreachable data URL without reading
//! the message. Fetch failures inside expansion never become errors; see
//! [`crate::fetch::FetchResult`].

use crate::shacl::EvaluatorError;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Which request input an error concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GraphRole {
    Data,
    Shapes,
    Ontology,
}

/// Stable, machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Missing, ambiguous or unknown caller input
    InputError,
    /// Text that no supported serialization accepts
    ParseError,
    /// Mandatory graph URL could not be dereferenced
    FetchError,
    /// Mandatory graph parsed to zero triples
    EmptyGraph,
    EvaluatorError,
    /// Request deadline exceeded
    Timeout,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::InputError
            | ErrorCode::ParseError
            | ErrorCode::FetchError
            | ErrorCode::EmptyGraph => StatusCode::BAD_REQUEST,
            ErrorCode::EvaluatorError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Whether the client caused the failure
    pub fn is_client_error(self) -> bool {
        self.status().is_client_error()
    }
}

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("{reason}")]
    Input { reason: String },

    #[error("Bad syntax in {graph} graph: {reason}")]
    Parse { graph: GraphRole, reason: String },

    #[error("Could not fetch {graph} graph from {url}: {reason}")]
    Fetch {
        graph: GraphRole,
        url: String,
        reason: String,
    },

    #[error("{} graph cannot be empty.", capitalized(*graph))]
    EmptyGraph { graph: GraphRole },

    #[error("SHACL evaluation failed: {0}")]
    Evaluator(#[from] EvaluatorError),

    #[error("Validation did not finish within {}s", after.as_secs())]
    Timeout { after: Duration },
}

impl ValidatorError {
    pub fn input(reason: impl Into<String>) -> Self {
        ValidatorError::Input {
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ValidatorError::Input { .. } => ErrorCode::InputError,
            ValidatorError::Parse { .. } => ErrorCode::ParseError,
            ValidatorError::Fetch { .. } => ErrorCode::FetchError,
            ValidatorError::EmptyGraph { .. } => ErrorCode::EmptyGraph,
            ValidatorError::Evaluator(_) => ErrorCode::EvaluatorError,
            ValidatorError::Timeout { .. } => ErrorCode::Timeout,
        }
    }

    /// Input the error concerns, when there is one
    pub fn graph(&self) -> Option<GraphRole> {
        match self {
            ValidatorError::Parse { graph, .. }
            | ValidatorError::Fetch { graph, .. }
            | ValidatorError::EmptyGraph { graph } => Some(*graph),
            _ => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
            graph: self.graph(),
            error_id: generate_error_id(),
            timestamp: chrono::Utc::now(),
        }
    }
}

fn capitalized(role: GraphRole) -> &'static str {
    match role {
        GraphRole::Data => "Data",
        GraphRole::Shapes => "Shapes",
        GraphRole::Ontology => "Ontology",
    }
}

/// JSON body returned for failed requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphRole>,
    /// Unique id to correlate the response with server logs
    pub error_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorBody {
    /// Body for failures detected outside the orchestrator, such as an
    /// unacceptable `Accept` header.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            graph: None,
            error_id: generate_error_id(),
            timestamp: chrono::Utc::now(),
        }
    }
}

fn generate_error_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let timestamp = chrono::Utc::now().timestamp_millis();
    format!("err_{:x}_{:x}", timestamp, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_kebab_case() {
        assert_eq!(ErrorCode::EmptyGraph.to_string(), "empty-graph");
        let label: &'static str = ErrorCode::InputError.into();
        assert_eq!(label, "input-error");
        assert_eq!(
            serde_json::to_string(&ErrorCode::FetchError).unwrap(),
            "\"fetch-error\""
        );
    }

    #[test]
    fn empty_graph_message_names_the_graph() {
        let err = ValidatorError::EmptyGraph {
            graph: GraphRole::Data,
        };
        assert_eq!(err.to_string(), "Data graph cannot be empty.");
        assert_eq!(err.code(), ErrorCode::EmptyGraph);
        assert_eq!(err.graph(), Some(GraphRole::Data));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::ParseError.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ErrorCode::EvaluatorError.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(ErrorCode::InputError.is_client_error());
    }

    #[test]
    fn body_serializes_code_and_graph() {
        let body = ValidatorError::Parse {
            graph: GraphRole::Shapes,
            reason: "unexpected token".into(),
        }
        .to_body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "parse-error");
        assert_eq!(json["graph"], "shapes");
        assert!(json["errorId"].as_str().unwrap().starts_with("err_"));
    }

    #[test]
    fn error_ids_are_unique() {
        let a = ErrorBody::new(ErrorCode::InputError, "a");
        let b = ErrorBody::new(ErrorCode::InputError, "a");
        assert_ne!(a.error_id, b.error_id);
    }
}
