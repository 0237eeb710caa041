//! Mapping of service errors onto HTTP responses.
//!
//! Every error body has the shape `{ "error": kind, "message": text, "reason"?: code }`.
//! Internal failures are logged and reported without detail.
//!
//! A version conflict answers `412 Precondition Failed` with the latest version in `ETag` and
//! its location in `Location`. The location is relative here; the router's location layer
//! turns it into an absolute URL.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use vrs_core::{CoreError, ErrorCategory};
use vrs_identifiers::IdError;

#[derive(Debug)]
pub enum RestError {
    Core(CoreError),
    BadRequest(String),
    Unauthorized,
    /// A failure outside the core services, e.g. rendering a response body.
    Internal(String),
}

pub type RestResult<T> = Result<T, RestError>;

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error kind, e.g. `version_conflict`.
    pub error: String,
    pub message: String,
    /// Finer reason code where one kind covers several situations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<CoreError> for RestError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<IdError> for RestError {
    fn from(err: IdError) -> Self {
        Self::Core(err.into())
    }
}

pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::ClientError | ErrorCategory::QueryExecution => StatusCode::BAD_REQUEST,
        ErrorCategory::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Conflict => StatusCode::CONFLICT,
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Quoted entity tag for a version id.
pub fn etag_value(version: impl std::fmt::Display) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("\"{version}\"")).ok()
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => {
                body(StatusCode::BAD_REQUEST, "bad_request", message, None)
            }
            Self::Unauthorized => body(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "missing or invalid API key".into(),
                None,
            ),
            Self::Internal(detail) => {
                tracing::error!("request failed: {detail}");
                body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "internal error".into(),
                    None,
                )
            }
            Self::Core(err) => core_error_response(err),
        }
    }
}

fn core_error_response(err: CoreError) -> Response {
    let category = err.category();
    let reason = match &err {
        CoreError::NoVersionBeforeInstant { .. } => Some("no_version_at_time".to_owned()),
        _ => None,
    };
    let message = if category == ErrorCategory::Internal {
        tracing::error!("request failed: {err}");
        "internal error".to_owned()
    } else {
        err.to_string()
    };

    let mut response = body(status_for(category), err.kind(), message, reason);
    if let CoreError::VersionConflict(conflict) = &err {
        let headers = response.headers_mut();
        if let Some(etag) = etag_value(&conflict.latest) {
            headers.insert(header::ETAG, etag);
        }
        if let Ok(location) = HeaderValue::from_str(&conflict.location) {
            headers.insert(header::LOCATION, location);
        }
    }
    response
}

fn body(status: StatusCode, kind: &str, message: String, reason: Option<String>) -> Response {
    let body = ErrorBody {
        error: kind.to_owned(),
        message,
        reason,
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrs_core::ObjectVersionId;

    #[test]
    fn conflict_carries_latest_version_headers() {
        let latest = ObjectVersionId::parse("8849182c-82ad-4088-a07f-48ead4180515::node::3")
            .expect("valid version");
        let err = CoreError::VersionConflict(Box::new(vrs_core::VersionConflict {
            location: format!("ehr/e/directory/{latest}"),
            latest,
        }));

        let response = RestError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
        assert_eq!(
            response.headers().get(header::ETAG).expect("etag"),
            "\"8849182c-82ad-4088-a07f-48ead4180515::node::3\""
        );
        assert_eq!(
            response.headers().get(header::LOCATION).expect("location"),
            "ehr/e/directory/8849182c-82ad-4088-a07f-48ead4180515::node::3"
        );
    }

    #[test]
    fn categories_map_to_statuses() {
        assert_eq!(status_for(ErrorCategory::ClientError), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorCategory::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorCategory::Conflict), StatusCode::CONFLICT);
        assert_eq!(
            status_for(ErrorCategory::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
