use crate::dto::StatusRes;
use crate::state::AppState;
use axum::{extract::State, Json};

#[utoipa::path(
    get,
    path = "/status",
    tag = "status",
    responses(
        (status = 200, description = "Service status", body = StatusRes)
    )
)]
/// Liveness endpoint for the REST API
///
/// Returns whether the service is up and which node name it commits versions under. This route
/// is never behind the API key, so load balancers can probe it.
#[axum::debug_handler]
pub async fn status(State(state): State<AppState>) -> Json<StatusRes> {
    Json(StatusRes {
        ok: true,
        message: "VRS REST API is alive".into(),
        node_name: state.cfg.node_name().to_string(),
    })
}
