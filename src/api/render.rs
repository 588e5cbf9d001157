//! Response encoding and error mapping.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::FamilyTreeError;
use crate::graph::{Person, Relationship};

const XML: &str = "application/xml";

/// Body encoding picked from the `Accept` header. JSON unless XML is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Xml,
}

impl Format {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let wants_xml = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|accept| {
                accept
                    .split(',')
                    .any(|part| part.trim().starts_with(XML) || part.trim().starts_with("text/xml"))
            })
            .unwrap_or(false);
        if wants_xml {
            Format::Xml
        } else {
            Format::Json
        }
    }
}

/// Encode `value` as JSON or as XML under `root`.
pub fn render<T: Serialize>(
    format: Format,
    status: StatusCode,
    root: &str,
    value: &T,
) -> Result<Response, ApiError> {
    match format {
        Format::Json => Ok((status, Json(value)).into_response()),
        Format::Xml => {
            let body = quick_xml::se::to_string_with_root(root, value)
                .map_err(|e| FamilyTreeError::Serialization(e.to_string()))?;
            Ok((status, [(header::CONTENT_TYPE, HeaderValue::from_static(XML))], body).into_response())
        }
    }
}

#[derive(Serialize)]
pub struct PeopleXml<'a> {
    pub person: &'a [Person],
}

#[derive(Serialize)]
pub struct RelationshipsXml<'a> {
    pub relationship: &'a [Relationship],
}

/// Decode a JSON request body, reporting malformed input as a 400.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError(FamilyTreeError::InvalidInput(format!("invalid JSON body: {}", e))))
}

pub fn status_for(err: &FamilyTreeError) -> StatusCode {
    match err {
        FamilyTreeError::PersonNotFound(_) | FamilyTreeError::RelationshipNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        FamilyTreeError::IncestuousOffspring { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        FamilyTreeError::SelfParentage(_) | FamilyTreeError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        FamilyTreeError::InconsistentGraph(_) => StatusCode::CONFLICT,
        FamilyTreeError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        FamilyTreeError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        FamilyTreeError::Database(_)
        | FamilyTreeError::Io(_)
        | FamilyTreeError::Config(_)
        | FamilyTreeError::Serialization(_)
        | FamilyTreeError::TaskJoin(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handler error: a [`FamilyTreeError`] rendered as `{"error", "message"}`.
#[derive(Debug)]
pub struct ApiError(pub FamilyTreeError);

impl From<FamilyTreeError> for ApiError {
    fn from(err: FamilyTreeError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        } else {
            log::debug!("Request rejected: {}", self.0);
        }

        // Infrastructure details stay in the log.
        let message = if self.0.is_infrastructure() {
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };

        (
            status,
            Json(serde_json::json!({
                "error": self.0.kind(),
                "message": message,
            })),
        )
            .into_response()
    }
}
