//! Shared API request/response types

use serde::{Deserialize, Serialize};

// ========================================
// Authentication Types
// ========================================

/// Authentication fields carried by every API request
///
/// POST bodies embed them next to the payload; GET requests pass them as
/// query parameters.
///
/// # Examples
///
/// ```
/// // GET /downloads/memberpress-invoices-2024-01-01-00-00-00.zip?timestamp=...&hash=...&operator=admin
/// use mpbi_common::api::types::AuthFields;
///
/// let auth = AuthFields {
///     timestamp: 1730000000000,
///     hash: "abc123...".to_string(),
///     operator: "admin".to_string(),
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthFields {
    /// Unix epoch time in milliseconds
    pub timestamp: i64,

    /// SHA-256 hash (64 hex chars)
    pub hash: String,

    /// Acting operator account
    pub operator: String,
}

// ========================================
// Error Response Types
// ========================================

/// Uniform failure body: `{"success": false, "error": {"code", "message"}}`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable code (`NO_PROGRESS_DATA`, `VALIDATION_FAILED`, ...)
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

// ========================================
// Tests
// ========================================
