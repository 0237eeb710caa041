//! # API REST
//!
//! REST API for VRS.
//!
//! Handles:
//! - HTTP endpoints with axum, one handler module per resource
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns: `Prefer`, `If-Match`, `ETag`/`Location`, CORS and the optional API
//!   key gate
//!
//! Business rules live in `vrs-core`; handlers only translate HTTP to service calls and
//! [`vrs_core::CoreError`] to status codes (see [`error`]).

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod headers;
pub mod state;

#[cfg(test)]
mod tests;

pub use state::AppState;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use handlers::{composition, directory, ehr, query, status};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        status::status,
        ehr::create_ehr,
        ehr::create_ehr_with_id,
        ehr::get_ehr,
        ehr::get_versioned_ehr_status,
        ehr::get_ehr_status_revision_history,
        ehr::get_ehr_status_version_at_time,
        ehr::get_ehr_status_version,
        ehr::get_ehr_status,
        ehr::update_ehr_status,
        directory::create_directory,
        directory::update_directory,
        directory::delete_directory,
        directory::get_directory,
        directory::get_directory_version,
        query::execute_adhoc_get,
        query::execute_adhoc_post,
        query::execute_stored_get,
        query::execute_stored_version_get,
        query::execute_stored_post,
        query::execute_stored_version_post,
        composition::create_composition,
        composition::get_composition,
        composition::update_composition,
        composition::delete_composition,
    ),
    components(schemas(
        error::ErrorBody,
        dto::StatusRes,
        dto::EhrRes,
        dto::VersionedObjectRes,
        dto::AuditRes,
        dto::RevisionItemRes,
        dto::RevisionHistoryRes,
        dto::OriginalVersionRes,
        dto::CompositionRes,
        dto::QueryReq,
        dto::StoredQueryReq,
        dto::QueryColumnRes,
        dto::QueryRes,
    )),
    tags(
        (name = "status", description = "Liveness"),
        (name = "ehr", description = "EHR creation and lookup"),
        (name = "ehr_status", description = "Versioned EHR_STATUS"),
        (name = "directory", description = "Versioned FOLDER tree of an EHR"),
        (name = "query", description = "Ad-hoc and stored queries"),
        (name = "composition", description = "Versioned compositions")
    )
)]
pub struct ApiDoc;

/// Builds the application router.
///
/// Every route except `/status` and the API docs sits behind [`auth::require_api_key`].
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/ehr", post(ehr::create_ehr))
        .route("/ehr/:ehr_id", get(ehr::get_ehr).put(ehr::create_ehr_with_id))
        .route(
            "/ehr/:ehr_id/versioned_ehr_status",
            get(ehr::get_versioned_ehr_status),
        )
        .route(
            "/ehr/:ehr_id/versioned_ehr_status/revision_history",
            get(ehr::get_ehr_status_revision_history),
        )
        .route(
            "/ehr/:ehr_id/versioned_ehr_status/version",
            get(ehr::get_ehr_status_version_at_time),
        )
        .route(
            "/ehr/:ehr_id/versioned_ehr_status/version/:version_uid",
            get(ehr::get_ehr_status_version),
        )
        .route(
            "/ehr/:ehr_id/ehr_status",
            get(ehr::get_ehr_status).put(ehr::update_ehr_status),
        )
        .route(
            "/ehr/:ehr_id/directory",
            get(directory::get_directory)
                .post(directory::create_directory)
                .put(directory::update_directory)
                .delete(directory::delete_directory),
        )
        .route(
            "/ehr/:ehr_id/directory/:version_uid",
            get(directory::get_directory_version),
        )
        .route(
            "/query/aql",
            get(query::execute_adhoc_get).post(query::execute_adhoc_post),
        )
        .route(
            "/query/:qualified_query_name",
            get(query::execute_stored_get).post(query::execute_stored_post),
        )
        .route(
            "/query/:qualified_query_name/:version",
            get(query::execute_stored_version_get).post(query::execute_stored_version_post),
        )
        .route("/composition", post(composition::create_composition))
        .route(
            "/composition/:uid",
            get(composition::get_composition)
                .put(composition::update_composition)
                .delete(composition::delete_composition),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/status", get(status::status))
        .merge(protected)
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(state.clone(), absolute_location)),
        )
        .with_state(state)
}

/// Starts the REST API server on `addr`.
///
/// # Errors
/// Returns an error if:
/// - the address cannot be bound, or
/// - the HTTP server fails while running.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    tracing::info!("-- Starting VRS REST API on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Rewrites a relative `Location` header against the configured base URL.
async fn absolute_location(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    let relative = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .filter(|location| !location.contains("://"))
        .map(str::to_owned);
    if let Some(relative) = relative {
        if let Ok(absolute) = HeaderValue::from_str(&state.cfg.absolute_location(&relative)) {
            response.headers_mut().insert(header::LOCATION, absolute);
        }
    }
    response
}
