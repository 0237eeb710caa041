//! Composition endpoints.
//!
//! Compositions are addressed by bare id (latest version) or full version id. For `PUT` and
//! `DELETE` the precondition is the `If-Match` header, or the version named in the path when the
//! header is absent.

use super::{parse_ehr_id, write_response};
use crate::dto::{CompositionCreateParams, CompositionRes};
use crate::error::{etag_value, ErrorBody, RestResult};
use crate::headers::{audit_details, if_match, version_headers, ReturnPreference};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use vrs_core::{
    ChangeType, Composition, ObjectVersionId, OriginalVersion, ResourceLocator,
    VersionIdentifier,
};

#[utoipa::path(
    post,
    path = "/composition",
    tag = "composition",
    params(CompositionCreateParams),
    responses(
        (status = 201, description = "Composition created", body = CompositionRes),
        (status = 400, description = "Body is not a JSON object", body = ErrorBody),
        (status = 404, description = "Unknown EHR", body = ErrorBody)
    )
)]
/// Add a composition to an EHR
///
/// # Returns
/// `201 Created` with `ETag`/`Location` of version 1 (`{uid}::{node}::1`).
#[axum::debug_handler]
pub async fn create_composition(
    State(state): State<AppState>,
    Query(params): Query<CompositionCreateParams>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> RestResult<Response> {
    let ehr_id = parse_ehr_id(&params.ehr_id)?;
    let composition = Composition::from_document(body)?;
    let audit = audit_details(&headers, ChangeType::Creation)?;

    let entry = state
        .compositions
        .create(&ehr_id, composition.clone(), audit)?;

    write_response(
        StatusCode::CREATED,
        ReturnPreference::from_headers(&headers),
        committed_headers(&entry.version),
        || Ok(representation(&entry.version, &ehr_id.to_string(), composition)),
    )
}

#[utoipa::path(
    get,
    path = "/composition/{uid}",
    tag = "composition",
    params(("uid" = String, Path, description = "Bare id (latest) or full version id")),
    responses(
        (status = 200, description = "The composition", body = CompositionRes),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 404, description = "Unknown, deleted or missing version", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_composition(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> RestResult<Response> {
    let found = state.compositions.retrieve(&uid)?;
    let mut response = Json(from_version(&found)).into_response();
    if let Some(etag) = etag_value(&found.entry.version) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    Ok(response)
}

#[utoipa::path(
    put,
    path = "/composition/{uid}",
    tag = "composition",
    params(
        ("uid" = String, Path, description = "Bare id or latest version id"),
        ("If-Match" = Option<String>, Header, description = "Latest version id")
    ),
    responses(
        (status = 200, description = "Updated (Prefer: return=representation)", body = CompositionRes),
        (status = 204, description = "Updated"),
        (status = 400, description = "No precondition or invalid body", body = ErrorBody),
        (status = 404, description = "Unknown or deleted composition", body = ErrorBody),
        (status = 412, description = "Precondition is not the latest version", body = ErrorBody)
    )
)]
/// Commit a new version of a composition
///
/// # Errors
/// - `400 Bad Request` if neither `If-Match` nor the path names a version.
/// - `412 Precondition Failed` if the named version is not the latest.
#[axum::debug_handler]
pub async fn update_composition(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> RestResult<Response> {
    let target = VersionIdentifier::parse(&uid)?;
    let expected = precondition(&headers, &target)?;
    let composition = Composition::from_document(body)?;
    let audit = audit_details(&headers, ChangeType::Modification)?;

    let object_id = target.object_id();
    let entry = state
        .compositions
        .update(&object_id, expected.as_ref(), composition, audit)?;

    write_response(
        StatusCode::OK,
        ReturnPreference::from_headers(&headers),
        committed_headers(&entry.version),
        || {
            let stored = state.compositions.retrieve(&entry.version.to_string())?;
            Ok(from_version(&stored))
        },
    )
}

#[utoipa::path(
    delete,
    path = "/composition/{uid}",
    tag = "composition",
    params(
        ("uid" = String, Path, description = "Bare id or latest version id"),
        ("If-Match" = Option<String>, Header, description = "Latest version id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "No precondition", body = ErrorBody),
        (status = 404, description = "Unknown or already deleted", body = ErrorBody),
        (status = 412, description = "Precondition is not the latest version", body = ErrorBody)
    )
)]
/// Delete a composition by committing a deletion version
#[axum::debug_handler]
pub async fn delete_composition(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    headers: HeaderMap,
) -> RestResult<Response> {
    let target = VersionIdentifier::parse(&uid)?;
    let expected = precondition(&headers, &target)?;
    let audit = audit_details(&headers, ChangeType::Deleted)?;

    let entry = state
        .compositions
        .delete(&target.object_id(), expected.as_ref(), audit)?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Some(etag) = etag_value(&entry.version) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    Ok(response)
}

/// `If-Match` wins; otherwise a versioned path id is the precondition.
fn precondition(
    headers: &HeaderMap,
    target: &VersionIdentifier,
) -> RestResult<Option<VersionIdentifier>> {
    let from_header = if_match(headers)?;
    Ok(from_header.or_else(|| target.version().map(|v| VersionIdentifier::from(v.clone()))))
}

fn committed_headers(version: &ObjectVersionId) -> Vec<(header::HeaderName, header::HeaderValue)> {
    version_headers(version, &ResourceLocator::Composition.location(version))
}

fn representation(
    version: &ObjectVersionId,
    ehr_id: &str,
    composition: Composition,
) -> CompositionRes {
    CompositionRes {
        uid: version.to_string(),
        ehr_id: ehr_id.to_owned(),
        template_id: composition.template_id,
        composition: composition.body,
    }
}

fn from_version(found: &OriginalVersion<Composition>) -> CompositionRes {
    representation(
        &found.entry.version,
        &found.snapshot.owner_id.to_string(),
        (*found.snapshot.content).clone(),
    )
}
