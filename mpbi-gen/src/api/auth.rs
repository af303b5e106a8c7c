//! Authentication middleware for mpbi-gen
//!
//! Two checks guard every `/api` and `/downloads` route:
//! 1. Authenticity token: timestamp + SHA-256 hash over the request
//!    (POST: JSON body; GET: `timestamp`, `hash`, `operator` query parameters)
//! 2. Privilege: the named operator must hold the manage capability
//!
//! Failures are uniform: 401 `security_check_failed` or 403
//! `permission_denied`. The specific cause is logged, never returned.
//! A shared secret of 0 disables both checks.

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use mpbi_common::api::types::AuthFields;
use mpbi_common::api::{check_operator, validate_hash, validate_timestamp, ApiAuthError, ErrorBody};
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::AppState;

/// Request body limit while buffering for hash validation
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if state.shared_secret == 0 {
        return Ok(next.run(request).await);
    }

    let path = request.uri().path().to_string();
    let (request, operator) = if *request.method() == Method::GET {
        validate_query_auth(&state, request)?
    } else {
        validate_body_auth(&state, request).await?
    };

    check_operator(&state.db, &operator)
        .await
        .map_err(|e| reject(&path, e))?;

    Ok(next.run(request).await)
}

/// GET requests sign `{"timestamp", "operator", "hash"}`
fn validate_query_auth(state: &AppState, request: Request) -> Result<(Request, String), AuthError> {
    let path = request.uri().path().to_string();
    let Query(fields) = Query::<AuthFields>::try_from_uri(request.uri()).map_err(|e| {
        reject(
            &path,
            ApiAuthError::ParseError(format!("Missing auth query parameters: {}", e)),
        )
    })?;

    validate_timestamp(fields.timestamp, state.config.auth).map_err(|e| reject(&path, e))?;

    let signed = json!({
        "timestamp": fields.timestamp,
        "operator": &fields.operator,
        "hash": &fields.hash,
    });
    validate_hash(&fields.hash, &signed, state.shared_secret).map_err(|e| reject(&path, e))?;

    Ok((request, fields.operator))
}

async fn validate_body_auth(
    state: &AppState,
    request: Request,
) -> Result<(Request, String), AuthError> {
    let path = request.uri().path().to_string();
    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| reject(&path, ApiAuthError::ParseError(format!("Failed to read body: {}", e))))?;

    let json_value: Value = serde_json::from_slice(&body_bytes)
        .map_err(|e| reject(&path, ApiAuthError::ParseError(format!("Invalid JSON: {}", e))))?;

    let timestamp = json_value
        .get("timestamp")
        .and_then(Value::as_i64)
        .ok_or_else(|| reject(&path, ApiAuthError::MissingTimestamp))?;
    let hash = json_value
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| reject(&path, ApiAuthError::MissingHash))?;
    let operator = json_value
        .get("operator")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    validate_timestamp(timestamp, state.config.auth).map_err(|e| reject(&path, e))?;
    validate_hash(hash, &json_value, state.shared_secret).map_err(|e| reject(&path, e))?;

    // Restore body for downstream handlers
    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok((request, operator))
}

/// Log the specific failure and map it to its uniform response
fn reject(path: &str, e: ApiAuthError) -> AuthError {
    match &e {
        ApiAuthError::InvalidHash {
            provided,
            calculated,
        } => warn!(
            path = %path,
            "Hash validation failed: provided={}, calculated={}", provided, calculated
        ),
        ApiAuthError::DatabaseError(detail) => {
            error!(path = %path, "Authentication database error: {}", detail);
            return AuthError::Internal;
        }
        other => warn!(path = %path, "Authentication failed: {}", other),
    }

    if e.is_token_failure() {
        AuthError::SecurityCheckFailed
    } else {
        AuthError::PermissionDenied
    }
}

/// Uniform authentication failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    SecurityCheckFailed,
    PermissionDenied,
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::SecurityCheckFailed => (
                StatusCode::UNAUTHORIZED,
                "security_check_failed",
                "Security check failed.",
            ),
            AuthError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                "permission_denied",
                "You do not have permission to perform this action.",
            ),
            AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Authentication could not be completed.",
            ),
        };

        (status, Json(ErrorBody::new(code, message))).into_response()
    }
}
