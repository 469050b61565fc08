use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use serde_json::json;

/// Checks the bearer token when a key is configured; without one every
/// request passes.
pub fn verify_bearer(
    headers: &HeaderMap,
    expected_key: Option<&str>,
) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
    let Some(expected_key) = expected_key else {
        return Ok(());
    };

    let token = extract_bearer_token(headers)?;
    if token.trim() != expected_key {
        return Err(unauthorized("Invalid API key"));
    }

    Ok(())
}

fn extract_bearer_token(
    headers: &HeaderMap,
) -> Result<&str, (StatusCode, Json<serde_json::Value>)> {
    let Some(raw_header) = headers.get(AUTHORIZATION) else {
        return Err(unauthorized("Missing Authorization header"));
    };

    let Ok(value) = raw_header.to_str() else {
        return Err(unauthorized("Invalid Authorization header"));
    };

    value
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Authorization must use Bearer token"))
}

fn unauthorized(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": message
            }
        })),
    )
}
