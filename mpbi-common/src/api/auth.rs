//! API authentication via timestamp and hash validation
//!
//! # Scheme
//!
//! - Every API request carries `timestamp` (i64 Unix epoch ms), `hash`
//!   (SHA-256, 64 hex chars) and `operator` (the acting account)
//! - Timestamp must fall inside the configured window (default ≤30s past,
//!   ≤1s future)
//! - Hash is calculated from canonical JSON + shared secret
//! - Shared secret is stored in the `settings` table; 0 disables auth
//! - The operator must hold the manage capability in the `operators` table
//!
//! This module contains ONLY pure functions and database operations.
//! The axum middleware lives in the service crate.

use crate::config::AuthWindow;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(feature = "sqlx")]
use sqlx::SqlitePool;

/// Settings key holding the shared secret
pub const SHARED_SECRET_KEY: &str = "api_shared_secret";

const DUMMY_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ========================================
// Error Types
// ========================================

/// Authentication error types
#[derive(Debug, Clone)]
pub enum ApiAuthError {
    /// Timestamp outside acceptable window
    InvalidTimestamp {
        timestamp: i64,
        now: i64,
        reason: String,
    },

    /// Hash does not match calculated value
    InvalidHash { provided: String, calculated: String },

    /// Timestamp field missing from request
    MissingTimestamp,

    /// Hash field missing from request
    MissingHash,

    /// Operator unknown or lacking the manage capability
    NotPermitted { operator: String },

    /// Database error loading shared secret or operator
    DatabaseError(String),

    /// Failed to parse request body
    ParseError(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::InvalidTimestamp { reason, .. } => {
                write!(f, "Invalid timestamp: {}", reason)
            }
            ApiAuthError::InvalidHash { .. } => write!(f, "Invalid hash"),
            ApiAuthError::MissingTimestamp => write!(f, "Missing timestamp field"),
            ApiAuthError::MissingHash => write!(f, "Missing hash field"),
            ApiAuthError::NotPermitted { operator } => {
                write!(f, "Operator '{}' may not manage invoices", operator)
            }
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
            ApiAuthError::ParseError(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

impl ApiAuthError {
    /// True for failures of the authenticity token itself (as opposed to
    /// privilege failures)
    pub fn is_token_failure(&self) -> bool {
        !matches!(self, ApiAuthError::NotPermitted { .. })
    }
}

// ========================================
// Shared Secret Management
// ========================================

/// Load shared secret from database settings, generating one if absent
///
/// Special value 0 disables auth checking.
#[cfg(feature = "sqlx")]
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(SHARED_SECRET_KEY)
            .fetch_optional(db)
            .await
            .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result {
        Some((value,)) => value
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate and store a random non-zero shared secret
#[cfg(feature = "sqlx")]
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let secret: i64 = {
        let mut rng = rand::thread_rng();
        loop {
            let val = rng.gen::<i64>();
            if val != 0 {
                break val;
            }
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SHARED_SECRET_KEY)
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(secret)
}

// ========================================
// Operator privilege
// ========================================

/// Check that `operator` exists and holds the manage capability
#[cfg(feature = "sqlx")]
pub async fn check_operator(db: &SqlitePool, operator: &str) -> Result<(), ApiAuthError> {
    let can_manage: Option<i64> =
        sqlx::query_scalar("SELECT can_manage FROM operators WHERE username = ?")
            .bind(operator)
            .fetch_optional(db)
            .await
            .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match can_manage {
        Some(flag) if flag != 0 => Ok(()),
        _ => Err(ApiAuthError::NotPermitted {
            operator: operator.to_string(),
        }),
    }
}

// ========================================
// Timestamp Validation
// ========================================

/// Current Unix time in milliseconds
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Validate timestamp against the allowed window
///
/// # Examples
///
/// ```
/// use mpbi_common::api::auth::{now_millis, validate_timestamp};
/// use mpbi_common::config::AuthWindow;
///
/// let window = AuthWindow { max_past_ms: 1000, max_future_ms: 1 };
/// let now = now_millis();
///
/// assert!(validate_timestamp(now, window).is_ok());
/// assert!(validate_timestamp(now - 500, window).is_ok());
/// assert!(validate_timestamp(now - 5000, window).is_err());
/// ```
pub fn validate_timestamp(timestamp: i64, window: AuthWindow) -> Result<(), ApiAuthError> {
    let now = now_millis();
    let diff = now - timestamp;

    if diff > window.max_past_ms {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms too old (max {}ms past)",
                diff, window.max_past_ms
            ),
        });
    }

    if diff < -window.max_future_ms {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms in future (max {}ms future)",
                diff.abs(),
                window.max_future_ms
            ),
        });
    }

    Ok(())
}

// ========================================
// Hash Calculation and Validation
// ========================================

/// Calculate the request hash
///
/// # Algorithm
///
/// 1. Replace hash field with dummy hash (64 zeros)
/// 2. Convert to canonical JSON (sorted keys, no whitespace)
/// 3. Append shared secret as decimal i64 string
/// 4. SHA-256 of the concatenation, as 64 hex characters
///
/// # Examples
///
/// ```
/// use mpbi_common::api::auth::calculate_hash;
/// use serde_json::json;
///
/// let json = json!({
///     "job_id": "5b0c6e9e-6a55-4f4e-9d8e-1f1f1f1f1f1f",
///     "timestamp": 1730000000000i64,
///     "hash": "dummy"
/// });
///
/// let hash = calculate_hash(&json, 123456789);
/// assert_eq!(hash.len(), 64);
/// ```
pub fn calculate_hash(json_value: &Value, shared_secret: i64) -> String {
    let mut value = json_value.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(DUMMY_HASH.to_string()));
    }

    let canonical = to_canonical_json(&value);
    let to_hash = format!("{}{}", canonical, shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
///
/// # Examples
///
/// ```
/// use mpbi_common::api::auth::to_canonical_json;
/// use serde_json::json;
///
/// let canonical = to_canonical_json(&json!({"z": 3, "a": [1, true, null]}));
/// assert_eq!(canonical, r#"{"a":[1,true,null],"z":3}"#);
/// ```
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("\"{}\":{}", k, to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

/// Validate hash matches calculated value
pub fn validate_hash(
    provided_hash: &str,
    json_value: &Value,
    shared_secret: i64,
) -> Result<(), ApiAuthError> {
    let calculated = calculate_hash(json_value, shared_secret);

    if provided_hash != calculated {
        return Err(ApiAuthError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }

    Ok(())
}

/// Add `timestamp`, `operator` and a valid `hash` to a JSON request body
///
/// Client-side counterpart of [`validate_hash`]. Non-object values are
/// returned unchanged.
pub fn sign_request(mut body: Value, operator: &str, shared_secret: i64) -> Value {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("timestamp".to_string(), Value::from(now_millis()));
        obj.insert("operator".to_string(), Value::String(operator.to_string()));
    } else {
        return body;
    }
    let hash = calculate_hash(&body, shared_secret);
    if let Some(obj) = body.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(hash));
    }
    body
}

// ========================================
// Tests
// ========================================
