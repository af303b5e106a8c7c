//! Transaction statistics endpoint

use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::error::ApiResult;
use crate::db::transactions::transaction_stats;
use crate::AppState;

/// POST /api/transactions/stats
///
/// Invoiceable payment transactions (confirmed and failed excluded) by status.
pub async fn get_transaction_stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let stats = transaction_stats(&state.db, &state.config.table_prefix).await?;

    Ok(Json(json!({
        "success": true,
        "total": stats.total,
        "completed": stats.completed,
        "pending": stats.pending,
        "refunded": stats.refunded,
        "other": stats.other,
    })))
}
