//! Ad-hoc and stored query endpoints.
//!
//! `offset` and `fetch` may be numbers or numeric strings; fractions are truncated. On GET
//! routes every query-string value other than `q`, `offset` and `fetch` becomes a query
//! parameter.

use super::optional_json;
use crate::dto::{QueryReq, QueryRes, StoredQueryReq};
use crate::error::{ErrorBody, RestError, RestResult};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::collections::BTreeMap;
use vrs_core::query::{
    integer_from_json, integer_from_text, Dispatched, QueryOutcome, QueryParameters,
    QueryRequest, QueryVersionSelector, StoredQueryRequest,
};

#[utoipa::path(
    get,
    path = "/query/aql",
    tag = "query",
    params(
        ("q" = String, Query, description = "Query text"),
        ("offset" = Option<u64>, Query, description = "Rows to skip"),
        ("fetch" = Option<u64>, Query, description = "Maximum rows to return")
    ),
    responses(
        (status = 200, description = "Result set", body = QueryRes),
        (status = 204, description = "The query matched nothing"),
        (status = 400, description = "Missing q, bad paging or failed execution", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn execute_adhoc_get(
    State(state): State<AppState>,
    Query(mut params): Query<BTreeMap<String, String>>,
) -> RestResult<Response> {
    let text = params.remove("q").unwrap_or_default();
    let (offset, fetch) = paging_from_text(&mut params)?;
    let request = QueryRequest {
        text,
        parameters: text_parameters(params),
        offset,
        fetch,
    };
    respond(state.queries.execute_adhoc(request)?)
}

#[utoipa::path(
    post,
    path = "/query/aql",
    tag = "query",
    request_body = QueryReq,
    responses(
        (status = 200, description = "Result set", body = QueryRes),
        (status = 204, description = "The query matched nothing"),
        (status = 400, description = "Missing q, bad paging or failed execution", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn execute_adhoc_post(
    State(state): State<AppState>,
    Json(body): Json<QueryReq>,
) -> RestResult<Response> {
    let request = QueryRequest {
        text: body.q,
        parameters: body.query_parameters,
        offset: paging_from_json("offset", body.offset.as_ref())?,
        fetch: paging_from_json("fetch", body.fetch.as_ref())?,
    };
    respond(state.queries.execute_adhoc(request)?)
}

#[utoipa::path(
    get,
    path = "/query/{qualified_query_name}",
    tag = "query",
    params(
        ("qualified_query_name" = String, Path, description = "e.g. `org.example::vitals`"),
        ("offset" = Option<u64>, Query, description = "Rows to skip"),
        ("fetch" = Option<u64>, Query, description = "Maximum rows to return")
    ),
    responses(
        (status = 200, description = "Result set of the latest version", body = QueryRes),
        (status = 404, description = "No such stored query", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn execute_stored_get(
    State(state): State<AppState>,
    Path(qualified_name): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> RestResult<Response> {
    stored_from_query_string(&state, qualified_name, None, params)
}

#[utoipa::path(
    get,
    path = "/query/{qualified_query_name}/{version}",
    tag = "query",
    params(
        ("qualified_query_name" = String, Path, description = "e.g. `org.example::vitals`"),
        ("version" = String, Path, description = "`1`, `1.2`, `1.2.3` or `LATEST`"),
        ("offset" = Option<u64>, Query, description = "Rows to skip"),
        ("fetch" = Option<u64>, Query, description = "Maximum rows to return")
    ),
    responses(
        (status = 200, description = "Result set of the highest matching version", body = QueryRes),
        (status = 400, description = "Malformed version", body = ErrorBody),
        (status = 404, description = "No matching stored query", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn execute_stored_version_get(
    State(state): State<AppState>,
    Path((qualified_name, version)): Path<(String, String)>,
    Query(params): Query<BTreeMap<String, String>>,
) -> RestResult<Response> {
    stored_from_query_string(&state, qualified_name, Some(&version), params)
}

#[utoipa::path(
    post,
    path = "/query/{qualified_query_name}",
    tag = "query",
    params(("qualified_query_name" = String, Path, description = "e.g. `org.example::vitals`")),
    request_body = StoredQueryReq,
    responses(
        (status = 200, description = "Result set of the latest version", body = QueryRes),
        (status = 404, description = "No such stored query", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn execute_stored_post(
    State(state): State<AppState>,
    Path(qualified_name): Path<String>,
    body: Bytes,
) -> RestResult<Response> {
    stored_from_body(&state, qualified_name, None, &body)
}

#[utoipa::path(
    post,
    path = "/query/{qualified_query_name}/{version}",
    tag = "query",
    params(
        ("qualified_query_name" = String, Path, description = "e.g. `org.example::vitals`"),
        ("version" = String, Path, description = "`1`, `1.2`, `1.2.3` or `LATEST`")
    ),
    request_body = StoredQueryReq,
    responses(
        (status = 200, description = "Result set of the highest matching version", body = QueryRes),
        (status = 400, description = "Malformed version", body = ErrorBody),
        (status = 404, description = "No matching stored query", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn execute_stored_version_post(
    State(state): State<AppState>,
    Path((qualified_name, version)): Path<(String, String)>,
    body: Bytes,
) -> RestResult<Response> {
    stored_from_body(&state, qualified_name, Some(&version), &body)
}

fn stored_from_query_string(
    state: &AppState,
    qualified_name: String,
    version: Option<&str>,
    mut params: BTreeMap<String, String>,
) -> RestResult<Response> {
    let (offset, fetch) = paging_from_text(&mut params)?;
    let request = StoredQueryRequest {
        qualified_name,
        version: QueryVersionSelector::parse(version)?,
        parameters: text_parameters(params),
        offset,
        fetch,
    };
    respond(state.queries.execute_stored(request)?)
}

fn stored_from_body(
    state: &AppState,
    qualified_name: String,
    version: Option<&str>,
    body: &Bytes,
) -> RestResult<Response> {
    let body: StoredQueryReq = match optional_json(body)? {
        Some(value) => serde_json::from_value(value)
            .map_err(|err| RestError::BadRequest(format!("invalid query body: {err}")))?,
        None => StoredQueryReq::default(),
    };
    let request = StoredQueryRequest {
        qualified_name,
        version: QueryVersionSelector::parse(version)?,
        parameters: body.query_parameters,
        offset: paging_from_json("offset", body.offset.as_ref())?,
        fetch: paging_from_json("fetch", body.fetch.as_ref())?,
    };
    respond(state.queries.execute_stored(request)?)
}

fn respond(dispatched: Dispatched) -> RestResult<Response> {
    match dispatched.outcome {
        QueryOutcome::Rows(response) => Ok(Json(QueryRes::from(response)).into_response()),
        QueryOutcome::NoContent => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

fn paging_from_text(
    params: &mut BTreeMap<String, String>,
) -> RestResult<(Option<u64>, Option<u64>)> {
    let mut take = |field: &str| -> RestResult<Option<u64>> {
        params
            .remove(field)
            .filter(|v| !v.trim().is_empty())
            .map(|v| integer_from_text(field, &v))
            .transpose()
            .map_err(RestError::from)
    };
    let offset = take("offset")?;
    let fetch = take("fetch")?;
    Ok((offset, fetch))
}

fn paging_from_json(field: &str, value: Option<&Value>) -> RestResult<Option<u64>> {
    Ok(value
        .filter(|v| !v.is_null())
        .map(|v| integer_from_json(field, v))
        .transpose()?)
}

fn text_parameters(params: BTreeMap<String, String>) -> QueryParameters {
    params
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect()
}
