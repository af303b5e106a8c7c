//! MemberPress transaction rows (read-only)

use serde::{Deserialize, Serialize};

/// One row of `{prefix}mepr_transactions`, plus the customer email when the
/// users table is available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub amount: f64,
    pub total: f64,
    pub status: String,
    pub txn_type: String,
    pub trans_num: String,
    /// `YYYY-MM-DD HH:MM:SS`
    pub created_at: String,
    pub customer_email: Option<String>,
}

/// Invoiceable payment transactions grouped by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStats {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
    pub refunded: i64,
    pub other: i64,
}
