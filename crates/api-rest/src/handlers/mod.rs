//! HTTP handlers, one module per resource.

pub mod composition;
pub mod directory;
pub mod ehr;
pub mod query;
pub mod status;

use crate::error::{RestError, RestResult};
use crate::headers::ReturnPreference;
use axum::{
    body::Bytes,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use vrs_core::ObjectId;

pub(crate) fn parse_ehr_id(raw: &str) -> RestResult<ObjectId> {
    Ok(ObjectId::parse(raw)?)
}

/// Response to a successful write.
///
/// With `Prefer: return=representation` the body is built by `representation`; otherwise the body
/// is empty and a `200` becomes `204 No Content`.
pub(crate) fn write_response<B: Serialize>(
    status: StatusCode,
    preference: ReturnPreference,
    headers: Vec<(HeaderName, HeaderValue)>,
    representation: impl FnOnce() -> RestResult<B>,
) -> RestResult<Response> {
    if preference.wants_body() {
        return Ok((status, AppendHeaders(headers), Json(representation()?)).into_response());
    }
    let status = if status == StatusCode::OK {
        StatusCode::NO_CONTENT
    } else {
        status
    };
    Ok((status, AppendHeaders(headers)).into_response())
}

/// Parses an optional JSON request body; blank bodies are `None`.
pub(crate) fn optional_json(body: &Bytes) -> RestResult<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|err| RestError::BadRequest(format!("invalid JSON body: {err}")))
}

pub(crate) fn to_json(value: &impl Serialize) -> RestResult<Value> {
    serde_json::to_value(value).map_err(|err| RestError::Internal(err.to_string()))
}
