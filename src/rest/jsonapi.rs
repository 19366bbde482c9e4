// Copyright 2025 Cowboy AI, LLC.

//! JSON:API documents and error mapping

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::errors::{DomainError, ErrorCategory};

/// One resource object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource<A> {
    /// Resource type
    #[serde(rename = "type")]
    pub kind: String,
    /// Resource id
    pub id: String,
    /// Resource attributes
    pub attributes: A,
}

impl<A> Resource<A> {
    /// Resource of `kind` identified by `id`
    pub fn new(kind: &str, id: impl ToString, attributes: A) -> Self {
        Self {
            kind: kind.to_string(),
            id: id.to_string(),
            attributes,
        }
    }
}

/// Resource object as submitted by a client; the id is optional
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewResource<A> {
    /// Resource type
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Client-chosen id, if any
    #[serde(default)]
    pub id: Option<String>,
    /// Resource attributes
    pub attributes: A,
}

/// Top-level document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<D> {
    /// Primary data
    pub data: D,
}

impl<D> Document<D> {
    /// Wrap `data`
    pub fn new(data: D) -> Self {
        Self { data }
    }
}

/// Single-resource response
pub fn single<A: Serialize>(
    kind: &str,
    id: impl ToString,
    attributes: A,
) -> Json<Document<Resource<A>>> {
    Json(Document::new(Resource::new(kind, id, attributes)))
}

/// Collection response
pub fn collection<A, I, F>(kind: &str, items: I, id_of: F) -> Json<Document<Vec<Resource<A>>>>
where
    A: Serialize,
    I: IntoIterator<Item = A>,
    F: Fn(&A) -> String,
{
    Json(Document::new(
        items
            .into_iter()
            .map(|a| Resource::new(kind, id_of(&a), a))
            .collect(),
    ))
}

/// JSON:API error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// HTTP status as a string
    pub status: String,
    /// Error category
    pub code: String,
    /// Short summary
    pub title: String,
    /// Occurrence detail
    pub detail: String,
}

/// Error document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDocument {
    /// Errors
    pub errors: Vec<ErrorObject>,
}

/// HTTP status for a domain error
pub fn status_for(err: &DomainError) -> StatusCode {
    match err.category() {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Conflict => StatusCode::CONFLICT,
        ErrorCategory::TransientStorage => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Cancelled => StatusCode::REQUEST_TIMEOUT,
        ErrorCategory::TransientBus | ErrorCategory::Fatal | ErrorCategory::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// A [`DomainError`] leaving through the HTTP edge
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(DomainError::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(DomainError::validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(DomainError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let category = self.0.category();
        if status.is_server_error() {
            error!(category = %category, error = %self.0, "Request failed");
        } else {
            debug!(category = %category, error = %self.0, "Request rejected");
        }
        let body = ErrorDocument {
            errors: vec![ErrorObject {
                status: status.as_u16().to_string(),
                code: category.to_string(),
                title: status.canonical_reason().unwrap_or("Error").to_string(),
                detail: self.0.to_string(),
            }],
        };
        (status, Json(body)).into_response()
    }
}

/// Handler result
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(DomainError::validation("bad"), StatusCode::BAD_REQUEST; "validation")]
    #[test_case(
        DomainError::SerializationError("bad json".into()), StatusCode::BAD_REQUEST;
        "serialization"
    )]
    #[test_case(DomainError::not_found("ban", 7), StatusCode::NOT_FOUND; "not found")]
    #[test_case(DomainError::conflict("full"), StatusCode::CONFLICT; "conflict")]
    #[test_case(
        DomainError::TransientStorage("down".into()), StatusCode::SERVICE_UNAVAILABLE;
        "transient storage"
    )]
    #[test_case(DomainError::Cancelled("late".into()), StatusCode::REQUEST_TIMEOUT; "cancelled")]
    #[test_case(
        DomainError::TransientBus("nats".into()), StatusCode::INTERNAL_SERVER_ERROR;
        "transient bus"
    )]
    #[test_case(
        DomainError::InvariantViolation("broken".into()), StatusCode::INTERNAL_SERVER_ERROR;
        "fatal"
    )]
    #[test_case(
        DomainError::InternalError("oops".into()), StatusCode::INTERNAL_SERVER_ERROR;
        "internal"
    )]
    fn test_status_mapping(err: DomainError, expected: StatusCode) {
        assert_eq!(status_for(&err), expected);
    }

    #[tokio::test]
    async fn test_error_body() {
        let response = ApiError(DomainError::not_found("ban", 7)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.errors.len(), 1);
        assert_eq!(body.errors[0].status, "404");
        assert_eq!(body.errors[0].code, "not_found");
        assert!(body.errors[0].detail.contains("ban"));
    }

    #[test]
    fn test_document_shape() {
        let Json(doc) = single("bans", 7, json!({"value": "10.0.0.1"}));
        assert_eq!(
            serde_json::to_value(doc).unwrap(),
            json!({"data": {"type": "bans", "id": "7", "attributes": {"value": "10.0.0.1"}}})
        );
    }

    #[test]
    fn test_new_resource_without_id() {
        let raw = json!({"data": {"type": "bans", "attributes": {"a": 1}}});
        let doc: Document<NewResource<serde_json::Value>> = serde_json::from_value(raw).unwrap();
        assert_eq!(doc.data.kind, "bans");
        assert!(doc.data.id.is_none());
    }
}
