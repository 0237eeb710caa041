//! Directory (`FOLDER` tree) endpoints.
//!
//! Reads that resolve to no folder at the requested path answer `204 No Content`; an EHR without
//! a directory answers `404`.

use super::{parse_ehr_id, write_response};
use crate::dto::{DirectoryParams, FolderPathParams};
use crate::error::{etag_value, ErrorBody, RestError, RestResult};
use crate::headers::{audit_details, if_match, parse_instant, version_headers, ReturnPreference};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use vrs_core::directory::wire::{tree_from_json_value, tree_to_json_value};
use vrs_core::{
    ChangeType, DirectoryView, FolderPath, Lookup, ObjectId, ObjectVersionId, ResourceLocator,
};

#[utoipa::path(
    post,
    path = "/ehr/{ehr_id}/directory",
    tag = "directory",
    params(("ehr_id" = String, Path, description = "EHR id")),
    responses(
        (status = 201, description = "Directory created"),
        (status = 400, description = "Invalid FOLDER body", body = ErrorBody),
        (status = 404, description = "Unknown EHR", body = ErrorBody),
        (status = 409, description = "EHR already has a directory", body = ErrorBody)
    )
)]
/// Create the EHR's directory from a `FOLDER` tree
///
/// # Returns
/// `201 Created` with `ETag` and `Location` of version 1. With `Prefer: return=representation`
/// the stored tree is returned with its `uid`.
///
/// # Errors
/// - `404 Not Found` if the EHR does not exist.
/// - `409 Conflict` if the EHR already has a directory.
#[axum::debug_handler]
pub async fn create_directory(
    State(state): State<AppState>,
    Path(ehr_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> RestResult<Response> {
    let ehr_id = parse_ehr_id(&ehr_id)?;
    let tree = tree_from_json_value(body)?;
    let audit = audit_details(&headers, ChangeType::Creation)?;

    let entry = state.directories.create(&ehr_id, tree.clone(), audit)?;

    write_response(
        StatusCode::CREATED,
        ReturnPreference::from_headers(&headers),
        committed_headers(ehr_id, &entry.version),
        || Ok(tree_to_json_value(&tree, Some(&entry.version))?),
    )
}

#[utoipa::path(
    put,
    path = "/ehr/{ehr_id}/directory",
    tag = "directory",
    params(
        ("ehr_id" = String, Path, description = "EHR id"),
        ("If-Match" = String, Header, description = "Latest directory version id"),
        FolderPathParams
    ),
    responses(
        (status = 200, description = "Updated tree (Prefer: return=representation)"),
        (status = 204, description = "Updated"),
        (status = 400, description = "Missing If-Match, bad path or body", body = ErrorBody),
        (status = 404, description = "Unknown EHR, directory or path", body = ErrorBody),
        (status = 412, description = "If-Match is not the latest version", body = ErrorBody)
    )
)]
/// Commit a new directory version
///
/// Without `path` the body replaces the whole tree; with `path` it replaces only that sub-folder
/// and every other folder is carried over unchanged.
///
/// # Errors
/// - `400 Bad Request` if `If-Match` is missing, or the path or body is malformed.
/// - `412 Precondition Failed` if `If-Match` is stale; `ETag`/`Location` name the latest version.
#[axum::debug_handler]
pub async fn update_directory(
    State(state): State<AppState>,
    Path(ehr_id): Path<String>,
    Query(params): Query<FolderPathParams>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> RestResult<Response> {
    let ehr_id = parse_ehr_id(&ehr_id)?;
    let path = FolderPath::parse_optional(params.path.as_deref())?;
    let expected = if_match(&headers)?;
    let subtree = tree_from_json_value(body)?;
    let audit = audit_details(&headers, ChangeType::Modification)?;

    let entry = state
        .directories
        .update_at_path(&ehr_id, expected.as_ref(), &path, subtree, audit)?;

    write_response(
        StatusCode::OK,
        ReturnPreference::from_headers(&headers),
        committed_headers(ehr_id, &entry.version),
        || match state.directories.get(&ehr_id, &entry.version, None)? {
            Lookup::Found(view) => Ok(tree_to_json_value(&view.folder, Some(&view.version))?),
            Lookup::NotFound => Err(RestError::Internal(format!(
                "committed directory version {} is not readable",
                entry.version
            ))),
        },
    )
}

#[utoipa::path(
    delete,
    path = "/ehr/{ehr_id}/directory",
    tag = "directory",
    params(
        ("ehr_id" = String, Path, description = "EHR id"),
        ("If-Match" = String, Header, description = "Latest directory version id")
    ),
    responses(
        (status = 204, description = "Directory detached from the EHR"),
        (status = 400, description = "Missing If-Match", body = ErrorBody),
        (status = 404, description = "Unknown EHR or no directory", body = ErrorBody),
        (status = 412, description = "If-Match is not the latest version", body = ErrorBody)
    )
)]
/// Delete the EHR's directory
///
/// Earlier versions stay readable through `GET /ehr/{ehr_id}/directory/{version_uid}`.
#[axum::debug_handler]
pub async fn delete_directory(
    State(state): State<AppState>,
    Path(ehr_id): Path<String>,
    headers: HeaderMap,
) -> RestResult<StatusCode> {
    let ehr_id = parse_ehr_id(&ehr_id)?;
    let expected = if_match(&headers)?;
    let audit = audit_details(&headers, ChangeType::Deleted)?;
    state.directories.delete(&ehr_id, expected.as_ref(), audit)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}/directory",
    tag = "directory",
    params(("ehr_id" = String, Path, description = "EHR id"), DirectoryParams),
    responses(
        (status = 200, description = "FOLDER in canonical JSON"),
        (status = 204, description = "No folder at that path"),
        (status = 400, description = "Malformed path or instant", body = ErrorBody),
        (status = 404, description = "Unknown EHR, no directory, or no version at that time", body = ErrorBody)
    )
)]
/// The directory (or the folder at `path`) as of `version_at_time`, latest when absent
#[axum::debug_handler]
pub async fn get_directory(
    State(state): State<AppState>,
    Path(ehr_id): Path<String>,
    Query(params): Query<DirectoryParams>,
) -> RestResult<Response> {
    let ehr_id = parse_ehr_id(&ehr_id)?;
    let at = parse_instant(params.version_at_time.as_deref())?;
    let found = state
        .directories
        .get_at_time(&ehr_id, at, params.path.as_deref())?;
    folder_response(found, params.path.as_deref())
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}/directory/{version_uid}",
    tag = "directory",
    params(
        ("ehr_id" = String, Path, description = "EHR id"),
        ("version_uid" = String, Path, description = "Full directory version id"),
        FolderPathParams
    ),
    responses(
        (status = 200, description = "FOLDER in canonical JSON"),
        (status = 204, description = "No folder at that path"),
        (status = 400, description = "Malformed version id or path", body = ErrorBody),
        (status = 404, description = "Unknown EHR or version", body = ErrorBody)
    )
)]
/// The folder at `path` within one explicit directory version
///
/// Works for versions of a directory that has since been deleted.
#[axum::debug_handler]
pub async fn get_directory_version(
    State(state): State<AppState>,
    Path((ehr_id, version_uid)): Path<(String, String)>,
    Query(params): Query<FolderPathParams>,
) -> RestResult<Response> {
    let ehr_id = parse_ehr_id(&ehr_id)?;
    let version = ObjectVersionId::parse(&version_uid)?;
    let found = state
        .directories
        .get(&ehr_id, &version, params.path.as_deref())?;
    folder_response(found, params.path.as_deref())
}

fn committed_headers(
    ehr_id: ObjectId,
    version: &ObjectVersionId,
) -> Vec<(header::HeaderName, header::HeaderValue)> {
    let location = ResourceLocator::Directory { ehr_id }.location(version);
    version_headers(version, &location)
}

/// `200` with the folder, or `204` when the path resolved to nothing.
///
/// Only the root folder carries the directory version as `uid`.
fn folder_response(found: Lookup<DirectoryView>, path: Option<&str>) -> RestResult<Response> {
    let Lookup::Found(view) = found else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let is_root = FolderPath::parse_optional(path)?.is_root();
    let uid = is_root.then_some(&view.version);
    let body = tree_to_json_value(&view.folder, uid)?;

    let mut response = Json(body).into_response();
    if let Some(etag) = etag_value(&view.version) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    Ok(response)
}
