use crate::error::RestError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Validates the provided API key against the configured one.
///
/// Returns `Ok(())` when no key is configured or the keys match.
pub fn validate_api_key(expected: Option<&str>, provided: Option<&str>) -> Result<(), RestError> {
    match expected {
        None => Ok(()),
        Some(expected) if provided == Some(expected) => Ok(()),
        Some(_) => Err(RestError::Unauthorized),
    }
}

/// Middleware rejecting requests without a valid `x-api-key` header.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(err) = validate_api_key(state.api_key.as_deref(), provided) {
        tracing::warn!(path = %request.uri().path(), "rejected request without valid API key");
        return err.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_when_no_key_configured() {
        assert!(validate_api_key(None, None).is_ok());
        assert!(validate_api_key(None, Some("anything")).is_ok());
    }

    #[test]
    fn configured_key_must_match() {
        assert!(validate_api_key(Some("secret"), Some("secret")).is_ok());
        assert!(validate_api_key(Some("secret"), Some("wrong")).is_err());
        assert!(validate_api_key(Some("secret"), None).is_err());
    }
}
