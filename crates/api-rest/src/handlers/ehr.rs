//! EHR and versioned `EHR_STATUS` endpoints.

use super::{optional_json, parse_ehr_id, to_json, write_response};
use crate::dto::{
    EhrRes, OriginalVersionRes, RevisionHistoryRes, VersionAtTimeParams, VersionedObjectRes,
};
use crate::error::{etag_value, ErrorBody, RestResult};
use crate::headers::{audit_details, if_match, parse_instant, version_headers, ReturnPreference};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use openehr::EhrStatus;
use serde_json::Value;
use vrs_core::ehr::stamped;
use vrs_core::{ChangeType, CoreError, EhrRecord, OriginalVersion, ResourceLocator};

#[utoipa::path(
    post,
    path = "/ehr",
    tag = "ehr",
    responses(
        (status = 201, description = "EHR created", body = EhrRes),
        (status = 400, description = "Invalid EHR_STATUS body", body = ErrorBody)
    )
)]
/// Create a new EHR with a generated id
///
/// The optional body is an `EHR_STATUS` in canonical JSON; without one the EHR starts queryable
/// and modifiable with no subject.
///
/// # Returns
/// `201 Created` with `Location: ehr/{ehr_id}` and `ETag` set to the EHR id. The body is the EHR
/// summary only with `Prefer: return=representation`.
///
/// # Errors
/// - `400 Bad Request` if the body is not a valid `EHR_STATUS`.
#[axum::debug_handler]
pub async fn create_ehr(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> RestResult<Response> {
    let status = ehr_status_from(optional_json(&body)?)?;
    let audit = audit_details(&headers, ChangeType::Creation)?;
    let record = state.ehrs.create_ehr(status, audit)?;
    created(&headers, &record)
}

#[utoipa::path(
    put,
    path = "/ehr/{ehr_id}",
    tag = "ehr",
    params(("ehr_id" = String, Path, description = "Id the new EHR should have")),
    responses(
        (status = 201, description = "EHR created", body = EhrRes),
        (status = 409, description = "EHR id already in use", body = ErrorBody)
    )
)]
/// Create a new EHR under a caller-chosen id
///
/// # Errors
/// - `400 Bad Request` for a malformed id or body.
/// - `409 Conflict` if the id is taken.
#[axum::debug_handler]
pub async fn create_ehr_with_id(
    State(state): State<AppState>,
    Path(ehr_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> RestResult<Response> {
    let ehr_id = parse_ehr_id(&ehr_id)?;
    let status = ehr_status_from(optional_json(&body)?)?;
    let audit = audit_details(&headers, ChangeType::Creation)?;
    let record = state.ehrs.create_ehr_with_id(ehr_id, status, audit)?;
    created(&headers, &record)
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}",
    tag = "ehr",
    params(("ehr_id" = String, Path, description = "EHR id")),
    responses(
        (status = 200, description = "EHR summary", body = EhrRes),
        (status = 404, description = "Unknown EHR", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_ehr(
    State(state): State<AppState>,
    Path(ehr_id): Path<String>,
) -> RestResult<Json<EhrRes>> {
    let record = state.ehrs.get_ehr(&parse_ehr_id(&ehr_id)?)?;
    Ok(Json(EhrRes::from(&record)))
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}/versioned_ehr_status",
    tag = "ehr_status",
    params(("ehr_id" = String, Path, description = "EHR id")),
    responses(
        (status = 200, description = "Versioned EHR_STATUS summary", body = VersionedObjectRes),
        (status = 404, description = "Unknown EHR", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_versioned_ehr_status(
    State(state): State<AppState>,
    Path(ehr_id): Path<String>,
) -> RestResult<Json<VersionedObjectRes>> {
    let summary = state.ehrs.versioned_ehr_status(&parse_ehr_id(&ehr_id)?)?;
    Ok(Json(summary.into()))
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}/versioned_ehr_status/revision_history",
    tag = "ehr_status",
    params(("ehr_id" = String, Path, description = "EHR id")),
    responses(
        (status = 200, description = "One item per EHR_STATUS version", body = RevisionHistoryRes),
        (status = 404, description = "Unknown EHR", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_ehr_status_revision_history(
    State(state): State<AppState>,
    Path(ehr_id): Path<String>,
) -> RestResult<Json<RevisionHistoryRes>> {
    let history = state.ehrs.revision_history(&parse_ehr_id(&ehr_id)?)?;
    Ok(Json(RevisionHistoryRes::from(&history)))
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}/versioned_ehr_status/version",
    tag = "ehr_status",
    params(("ehr_id" = String, Path, description = "EHR id"), VersionAtTimeParams),
    responses(
        (status = 200, description = "Version active at the instant", body = OriginalVersionRes),
        (status = 400, description = "Malformed instant", body = ErrorBody),
        (status = 404, description = "Unknown EHR or no version at that time", body = ErrorBody)
    )
)]
/// The `EHR_STATUS` version active at `version_at_time` (latest when absent)
///
/// # Errors
/// - `404 Not Found` with reason `no_version_at_time` when the instant predates the EHR.
#[axum::debug_handler]
pub async fn get_ehr_status_version_at_time(
    State(state): State<AppState>,
    Path(ehr_id): Path<String>,
    Query(params): Query<VersionAtTimeParams>,
) -> RestResult<Response> {
    let ehr_id = parse_ehr_id(&ehr_id)?;
    let at = parse_instant(params.version_at_time.as_deref())?;
    let found = state.ehrs.ehr_status_at_time(&ehr_id, at)?;
    original_version(found)
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}/versioned_ehr_status/version/{version_uid}",
    tag = "ehr_status",
    params(
        ("ehr_id" = String, Path, description = "EHR id"),
        ("version_uid" = String, Path, description = "Full version id `uuid::node::n`")
    ),
    responses(
        (status = 200, description = "The named version", body = OriginalVersionRes),
        (status = 400, description = "Malformed version id", body = ErrorBody),
        (status = 404, description = "Unknown EHR or version", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_ehr_status_version(
    State(state): State<AppState>,
    Path((ehr_id, version_uid)): Path<(String, String)>,
) -> RestResult<Response> {
    let ehr_id = parse_ehr_id(&ehr_id)?;
    let found = state.ehrs.ehr_status_at_version(&ehr_id, &version_uid)?;
    original_version(found)
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}/ehr_status",
    tag = "ehr_status",
    params(("ehr_id" = String, Path, description = "EHR id"), VersionAtTimeParams),
    responses(
        (status = 200, description = "EHR_STATUS in canonical JSON, uid set to its version"),
        (status = 404, description = "Unknown EHR or no version at that time", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_ehr_status(
    State(state): State<AppState>,
    Path(ehr_id): Path<String>,
    Query(params): Query<VersionAtTimeParams>,
) -> RestResult<Response> {
    let ehr_id = parse_ehr_id(&ehr_id)?;
    let at = parse_instant(params.version_at_time.as_deref())?;
    let found = state.ehrs.ehr_status_at_time(&ehr_id, at)?;

    let version = &found.entry.version;
    let body = to_json(&stamped(&found.snapshot.content, version))?;
    let mut response = Json(body).into_response();
    if let Some(etag) = etag_value(version) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    Ok(response)
}

#[utoipa::path(
    put,
    path = "/ehr/{ehr_id}/ehr_status",
    tag = "ehr_status",
    params(
        ("ehr_id" = String, Path, description = "EHR id"),
        ("If-Match" = String, Header, description = "Latest EHR_STATUS version id")
    ),
    responses(
        (status = 200, description = "Updated EHR_STATUS (Prefer: return=representation)"),
        (status = 204, description = "Updated"),
        (status = 400, description = "Missing If-Match or invalid body", body = ErrorBody),
        (status = 404, description = "Unknown EHR", body = ErrorBody),
        (status = 412, description = "If-Match is not the latest version", body = ErrorBody)
    )
)]
/// Replace the EHR's status with a new version
///
/// # Returns
/// `ETag` and `Location` of the new version; the stamped status as body only with
/// `Prefer: return=representation`.
///
/// # Errors
/// - `400 Bad Request` if `If-Match` is missing or the body is not an `EHR_STATUS`.
/// - `412 Precondition Failed` if `If-Match` is stale; `ETag`/`Location` name the latest version.
#[axum::debug_handler]
pub async fn update_ehr_status(
    State(state): State<AppState>,
    Path(ehr_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> RestResult<Response> {
    let ehr_id = parse_ehr_id(&ehr_id)?;
    let expected = if_match(&headers)?;
    let status = openehr::read_ehr_status_value(body).map_err(CoreError::from)?;
    let audit = audit_details(&headers, ChangeType::Modification)?;

    let entry = state
        .ehrs
        .update_ehr_status(&ehr_id, expected.as_ref(), status.clone(), audit)?;

    let location = ResourceLocator::EhrStatus { ehr_id }.location(&entry.version);
    write_response(
        StatusCode::OK,
        ReturnPreference::from_headers(&headers),
        version_headers(&entry.version, &location),
        || to_json(&stamped(&status, &entry.version)),
    )
}

fn ehr_status_from(body: Option<Value>) -> RestResult<Option<EhrStatus>> {
    let Some(value) = body else {
        return Ok(None);
    };
    let status = openehr::read_ehr_status_value(value).map_err(CoreError::from)?;
    Ok(Some(status))
}

fn created(headers: &HeaderMap, record: &EhrRecord) -> RestResult<Response> {
    write_response(
        StatusCode::CREATED,
        ReturnPreference::from_headers(headers),
        version_headers(record.ehr_id, &format!("ehr/{}", record.ehr_id)),
        || Ok(EhrRes::from(record)),
    )
}

fn original_version(found: OriginalVersion<EhrStatus>) -> RestResult<Response> {
    let data = to_json(&stamped(&found.snapshot.content, &found.entry.version))?;
    let mut response = Json(OriginalVersionRes::new(&found.entry, data)).into_response();
    if let Some(etag) = etag_value(&found.entry.version) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    Ok(response)
}
