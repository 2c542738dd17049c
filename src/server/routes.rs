use super::AppState;
use crate::catalog::GraphDescription;
use crate::error::{ErrorBody, ErrorCode, GraphRole, ValidatorError};
use crate::metrics::METRICS;
use crate::rdf::{SerializeError, negotiate, serialize_graph};
use crate::validator::{GraphSource, ValidationConfig, ValidationRequest};
use axum::{
    Json,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

pub async fn ping() -> &'static str {
    "OK"
}

pub async fn ready() -> &'static str {
    "OK"
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        METRICS.encode(),
    )
}

pub async fn list_shapes(State(state): State<Arc<AppState>>) -> Json<Vec<GraphDescription>> {
    Json(state.catalog.shapes.get_all().into_iter().cloned().collect())
}

pub async fn get_shapes(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    describe(state.catalog.shapes.get_by_id(&id))
}

pub async fn list_ontologies(State(state): State<Arc<AppState>>) -> Json<Vec<GraphDescription>> {
    Json(state.catalog.ontologies.get_all().into_iter().cloned().collect())
}

pub async fn get_ontology(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    describe(state.catalog.ontologies.get_by_id(&id))
}

fn describe(description: Option<&GraphDescription>) -> Response {
    match description {
        Some(description) => Json(description.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Body of `POST /validator`; each graph is given as text or as a URL.
///
/// Accepted as a JSON object or as `multipart/form-data` with the parts
/// `config`, `data-graph-file`, `data-graph-url`, `shapes-graph-file`,
/// `shapes-graph-url`, `ontology-graph-file` and `ontology-graph-url`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateBody {
    pub data_graph: Option<String>,
    pub data_graph_url: Option<String>,
    pub shapes_graph: Option<String>,
    pub shapes_graph_url: Option<String>,
    pub ontology_graph: Option<String>,
    pub ontology_graph_url: Option<String>,
    #[serde(default)]
    pub config: ValidationConfig,
}

impl ValidateBody {
    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ValidatorError> {
        let mut body = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_owned();
            debug!(part = %name, file_name = ?field.file_name(), "multipart part");
            if name == "config" {
                let bytes = field.bytes().await.map_err(multipart_error)?;
                body.config = serde_json::from_slice(&bytes)
                    .map_err(|e| ValidatorError::input(format!("Invalid config part: {e}")))?;
                continue;
            }
            let slot = match name.as_str() {
                "data-graph-file" => &mut body.data_graph,
                "data-graph-url" => &mut body.data_graph_url,
                "shapes-graph-file" => &mut body.shapes_graph,
                "shapes-graph-url" => &mut body.shapes_graph_url,
                "ontology-graph-file" => &mut body.ontology_graph,
                "ontology-graph-url" => &mut body.ontology_graph_url,
                _ => return Err(ValidatorError::input(format!("Unknown part in input: {name}"))),
            };
            *slot = Some(field.text().await.map_err(multipart_error)?);
        }
        Ok(body)
    }

    pub fn into_request(self) -> Result<ValidationRequest, ValidatorError> {
        let data = GraphSource::required(GraphRole::Data, self.data_graph, self.data_graph_url)?;
        let shapes = GraphSource::from_pair(GraphRole::Shapes, self.shapes_graph, self.shapes_graph_url)?;
        if shapes.is_none() && self.config.shapes_id.is_none() {
            return Err(ValidatorError::input("No shapes graph in input."));
        }
        let ontology =
            GraphSource::from_pair(GraphRole::Ontology, self.ontology_graph, self.ontology_graph_url)?;
        Ok(ValidationRequest {
            data,
            shapes,
            ontology,
            config: self.config,
        })
    }
}

fn multipart_error(error: axum::extract::multipart::MultipartError) -> ValidatorError {
    ValidatorError::input(error.body_text())
}

impl<S> FromRequest<S> for ValidateBody
where
    S: Send + Sync,
{
    type Rejection = ValidatorError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim_start().to_ascii_lowercase().starts_with("multipart/"));

        if multipart {
            let multipart = Multipart::from_request(request, state)
                .await
                .map_err(|rejection| ValidatorError::input(rejection.body_text()))?;
            Self::from_multipart(multipart).await
        } else {
            let Json(body) = Json::<Self>::from_request(request, state)
                .await
                .map_err(|rejection| ValidatorError::input(rejection.body_text()))?;
            Ok(body)
        }
    }
}

pub async fn validate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<ValidateBody, ValidatorError>,
) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());
    let Some(format) = negotiate(accept) else {
        debug!(?accept, "no acceptable serialization");
        return not_acceptable(accept);
    };

    let body = match body {
        Ok(body) => body,
        Err(e) => return e.into_response(),
    };
    let request = match body.into_request() {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    let outcome = match state.validator.validate(request).await {
        Ok(outcome) => outcome,
        Err(e) => return e.into_response(),
    };

    match serialize_graph(&outcome.response_graph(), format) {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, format.media_type())],
            bytes,
        )
            .into_response(),
        Err(SerializeError::Unsupported(_)) => not_acceptable(accept),
        Err(e) => {
            error!(error = %e, %format, "failed to serialize response graph");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(ErrorCode::EvaluatorError, e.to_string())),
            )
                .into_response()
        }
    }
}

fn not_acceptable(accept: Option<&str>) -> Response {
    let body = ErrorBody::new(
        ErrorCode::InputError,
        format!(
            "Cannot serialize the response as {}",
            accept.unwrap_or_default()
        ),
    );
    (StatusCode::NOT_ACCEPTABLE, Json(body)).into_response()
}
