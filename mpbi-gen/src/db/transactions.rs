//! Read-only queries against MemberPress tables
//!
//! Table names are built from the configured prefix, so they are checked
//! against a strict pattern before being interpolated into SQL. Everything
//! else is bound.

use chrono::NaiveDate;
use mpbi_common::Result;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, warn};

use crate::models::{ResolvedCriteria, Transaction, TransactionStats, TransactionStatus};

const TRANSACTIONS_SUFFIX: &str = "mepr_transactions";
const USERS_SUFFIX: &str = "users";

/// Only payment transactions carry invoices
const INVOICEABLE: &str = "t.txn_type = 'payment' AND t.status <> 'confirmed' AND t.status <> 'failed'";

/// `{prefix}mepr_transactions`, or `None` when the result is not a safe
/// table name
pub fn transactions_table(prefix: &str) -> Option<String> {
    let table = format!("{}{}", prefix, TRANSACTIONS_SUFFIX);
    is_safe_identifier(&table).then_some(table)
}

/// `{prefix}users`, or `None` when the result is not a safe table name
pub fn users_table(prefix: &str) -> Option<String> {
    let table = format!("{}{}", prefix, USERS_SUFFIX);
    is_safe_identifier(&table).then_some(table)
}

fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub async fn table_exists(db: &SqlitePool, name: &str) -> Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(db)
            .await?;
    Ok(found.is_some())
}

/// Resolve criteria to transaction ids, oldest first
///
/// Never fails: an unsafe table name, a missing table, an empty status set
/// or a query error all yield an empty list (query errors are logged).
pub async fn resolve_transaction_ids(
    db: &SqlitePool,
    table_prefix: &str,
    criteria: &ResolvedCriteria,
) -> Vec<i64> {
    let Some(table) = transactions_table(table_prefix) else {
        warn!(prefix = %table_prefix, "Invalid transactions table name, skipping query");
        return Vec::new();
    };

    if criteria.statuses.is_empty() {
        debug!("No known statuses selected, skipping query");
        return Vec::new();
    }

    match query_transaction_ids(db, table_prefix, &table, criteria).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!(table = %table, "Transaction id query failed: {}", e);
            Vec::new()
        }
    }
}

async fn query_transaction_ids(
    db: &SqlitePool,
    table_prefix: &str,
    table: &str,
    criteria: &ResolvedCriteria,
) -> Result<Vec<i64>> {
    if !table_exists(db, table).await? {
        debug!(table = %table, "Transactions table not found");
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT t.id FROM \"{}\" t", table));

    if let Some(email) = &criteria.customer_email {
        let Some(users) = users_table(table_prefix) else {
            return Ok(Vec::new());
        };
        if !table_exists(db, &users).await? {
            debug!(table = %users, "Users table not found, email filter matches nothing");
            return Ok(Vec::new());
        }
        builder.push(format!(" INNER JOIN \"{}\" u ON t.user_id = u.ID", users));
        // Stored emails keep their original case; the criteria value is lowercased
        builder.push(" WHERE LOWER(u.user_email) = ").push_bind(email.clone());
        builder.push(" AND ");
    } else {
        builder.push(" WHERE ");
    }

    builder.push(INVOICEABLE);
    push_status_filter(&mut builder, &criteria.statuses);

    if let Some((start, end)) = criteria.period {
        let (lower, upper) = period_bounds(start, end);
        builder.push(" AND t.created_at > ").push_bind(lower);
        builder.push(" AND t.created_at < ").push_bind(upper);
    }

    if let Some(membership_id) = criteria.membership_id {
        builder.push(" AND t.product_id = ").push_bind(membership_id);
    }

    builder.push(" ORDER BY t.created_at ASC, t.id ASC");

    let ids: Vec<i64> = builder.build_query_scalar().fetch_all(db).await?;
    debug!(count = ids.len(), "Resolved transaction ids");
    Ok(ids)
}

fn push_status_filter(builder: &mut QueryBuilder<'_, Sqlite>, statuses: &[TransactionStatus]) {
    builder.push(" AND t.status IN (");
    let mut separated = builder.separated(", ");
    for status in statuses {
        separated.push_bind(status.as_str());
    }
    separated.push_unseparated(")");
}

/// Exclusive comparison bounds covering whole days
fn period_bounds(start: NaiveDate, end: NaiveDate) -> (String, String) {
    (
        format!("{} 00:00:00", start.format("%Y-%m-%d")),
        format!("{} 23:59:59", end.format("%Y-%m-%d")),
    )
}

/// Load one transaction with its customer email (when the users table exists)
pub async fn load_transaction(
    db: &SqlitePool,
    table_prefix: &str,
    id: i64,
) -> Result<Option<Transaction>> {
    let Some(table) = transactions_table(table_prefix) else {
        return Ok(None);
    };

    let email_source = match users_table(table_prefix) {
        Some(users) if table_exists(db, &users).await? => Some(users),
        _ => None,
    };

    let sql = match email_source {
        Some(users) => format!(
            r#"
            SELECT t.id, t.user_id, t.product_id,
                   CAST(t.amount AS REAL) AS amount, CAST(t.total AS REAL) AS total,
                   t.status, t.txn_type, t.trans_num, t.created_at,
                   u.user_email AS customer_email
            FROM "{}" t
            LEFT JOIN "{}" u ON t.user_id = u.ID
            WHERE t.id = ?
            "#,
            table, users
        ),
        None => format!(
            r#"
            SELECT t.id, t.user_id, t.product_id,
                   CAST(t.amount AS REAL) AS amount, CAST(t.total AS REAL) AS total,
                   t.status, t.txn_type, t.trans_num, t.created_at,
                   NULL AS customer_email
            FROM "{}" t
            WHERE t.id = ?
            "#,
            table
        ),
    };

    let txn = sqlx::query_as::<_, Transaction>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(txn)
}

/// Count invoiceable payment transactions by status
///
/// A missing table yields all-zero stats.
pub async fn transaction_stats(db: &SqlitePool, table_prefix: &str) -> Result<TransactionStats> {
    let Some(table) = transactions_table(table_prefix) else {
        return Ok(TransactionStats::default());
    };
    if !table_exists(db, &table).await? {
        return Ok(TransactionStats::default());
    }

    let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
        "SELECT t.status, COUNT(*) FROM \"{}\" t WHERE {} GROUP BY t.status",
        table, INVOICEABLE
    ))
    .fetch_all(db)
    .await?;

    let mut stats = TransactionStats::default();
    for (status, count) in rows {
        stats.total += count;
        match status.parse::<TransactionStatus>() {
            Ok(TransactionStatus::Complete) => stats.completed += count,
            Ok(TransactionStatus::Pending) => stats.pending += count,
            Ok(TransactionStatus::Refunded) => stats.refunded += count,
            _ => stats.other += count,
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerationCriteria;
    use crate::test_support::{insert_transaction, insert_user, memberpress_pool};

    fn criteria(json: serde_json::Value) -> ResolvedCriteria {
        serde_json::from_value::<GenerationCriteria>(json)
            .unwrap()
            .validate()
            .unwrap()
    }

    #[test]
    fn test_table_name_checks() {
        assert_eq!(transactions_table("wp_").as_deref(), Some("wp_mepr_transactions"));
        assert_eq!(transactions_table("").as_deref(), Some("mepr_transactions"));
        assert_eq!(transactions_table("wp_; DROP TABLE x; --"), None);
        assert_eq!(users_table("wp-"), None);
    }

    #[test]
    fn test_period_bounds_cover_whole_days() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(
            period_bounds(start, end),
            ("2024-01-01 00:00:00".to_string(), "2024-01-31 23:59:59".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_table_yields_empty() {
        let db = memberpress_pool().await;
        let ids = resolve_transaction_ids(&db, "other_", &criteria(serde_json::json!({}))).await;
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_excludes_non_payment_and_never_invoiced_statuses() {
        let db = memberpress_pool().await;
        insert_transaction(&db, 1, 1, 1, "complete", "payment", "2024-01-02 10:00:00").await;
        insert_transaction(&db, 2, 1, 1, "confirmed", "payment", "2024-01-03 10:00:00").await;
        insert_transaction(&db, 3, 1, 1, "failed", "payment", "2024-01-04 10:00:00").await;
        insert_transaction(&db, 4, 1, 1, "complete", "subscription_confirmation", "2024-01-05 10:00:00").await;
        insert_transaction(&db, 5, 1, 1, "pending", "payment", "2024-01-01 10:00:00").await;

        let ids = resolve_transaction_ids(
            &db,
            "wp_",
            &criteria(serde_json::json!({"statuses": ["complete", "pending", "confirmed", "failed"]})),
        )
        .await;

        // Oldest first
        assert_eq!(ids, vec![5, 1]);
    }

    #[tokio::test]
    async fn test_period_bounds_are_exclusive() {
        let db = memberpress_pool().await;
        insert_transaction(&db, 1, 1, 1, "complete", "payment", "2024-01-01 00:00:00").await;
        insert_transaction(&db, 2, 1, 1, "complete", "payment", "2024-01-01 00:00:01").await;
        insert_transaction(&db, 3, 1, 1, "complete", "payment", "2024-01-31 23:59:58").await;
        insert_transaction(&db, 4, 1, 1, "complete", "payment", "2024-01-31 23:59:59").await;
        insert_transaction(&db, 5, 1, 1, "complete", "payment", "2024-02-01 08:00:00").await;

        let ids = resolve_transaction_ids(
            &db,
            "wp_",
            &criteria(serde_json::json!({
                "mode": "period",
                "start_date": "2024-01-01",
                "end_date": "2024-01-31"
            })),
        )
        .await;

        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_membership_and_email_filters() {
        let db = memberpress_pool().await;
        insert_user(&db, 10, "alice@example.com").await;
        insert_user(&db, 11, "bob@example.com").await;
        insert_transaction(&db, 1, 10, 100, "complete", "payment", "2024-01-01 10:00:00").await;
        insert_transaction(&db, 2, 10, 200, "complete", "payment", "2024-01-02 10:00:00").await;
        insert_transaction(&db, 3, 11, 100, "complete", "payment", "2024-01-03 10:00:00").await;

        let by_membership = resolve_transaction_ids(
            &db,
            "wp_",
            &criteria(serde_json::json!({"membership_id": 100})),
        )
        .await;
        assert_eq!(by_membership, vec![1, 3]);

        let by_email = resolve_transaction_ids(
            &db,
            "wp_",
            &criteria(serde_json::json!({"customer_email": "Alice@Example.com"})),
        )
        .await;
        assert_eq!(by_email, vec![1, 2]);

        let both = resolve_transaction_ids(
            &db,
            "wp_",
            &criteria(serde_json::json!({"customer_email": "alice@example.com", "membership_id": 200})),
        )
        .await;
        assert_eq!(both, vec![2]);
    }

    #[tokio::test]
    async fn test_email_filter_matches_mixed_case_stored_email() {
        let db = memberpress_pool().await;
        insert_user(&db, 10, "Alice@Example.com").await;
        insert_user(&db, 11, "bob@example.com").await;
        insert_transaction(&db, 1, 10, 100, "complete", "payment", "2024-01-01 10:00:00").await;
        insert_transaction(&db, 2, 11, 100, "complete", "payment", "2024-01-02 10:00:00").await;

        let exact = resolve_transaction_ids(
            &db,
            "wp_",
            &criteria(serde_json::json!({"customer_email": "Alice@Example.com"})),
        )
        .await;
        assert_eq!(exact, vec![1]);

        let lower = resolve_transaction_ids(
            &db,
            "wp_",
            &criteria(serde_json::json!({"customer_email": "alice@example.com"})),
        )
        .await;
        assert_eq!(lower, vec![1]);
    }

    #[tokio::test]
    async fn test_empty_restricted_statuses_skip_query() {
        let db = memberpress_pool().await;
        insert_transaction(&db, 1, 1, 1, "complete", "payment", "2024-01-01 10:00:00").await;

        let ids = resolve_transaction_ids(
            &db,
            "wp_",
            &criteria(serde_json::json!({"statuses": ["bogus"]})),
        )
        .await;
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_load_transaction_with_email() {
        let db = memberpress_pool().await;
        insert_user(&db, 10, "alice@example.com").await;
        insert_transaction(&db, 7, 10, 100, "complete", "payment", "2024-01-01 10:00:00").await;

        let txn = load_transaction(&db, "wp_", 7).await.unwrap().unwrap();
        assert_eq!(txn.id, 7);
        assert_eq!(txn.trans_num, "mp-txn-7");
        assert_eq!(txn.customer_email.as_deref(), Some("alice@example.com"));

        assert!(load_transaction(&db, "wp_", 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_by_status() {
        let db = memberpress_pool().await;
        insert_transaction(&db, 1, 1, 1, "complete", "payment", "2024-01-01 10:00:00").await;
        insert_transaction(&db, 2, 1, 1, "complete", "payment", "2024-01-01 10:00:00").await;
        insert_transaction(&db, 3, 1, 1, "pending", "payment", "2024-01-01 10:00:00").await;
        insert_transaction(&db, 4, 1, 1, "refunded", "payment", "2024-01-01 10:00:00").await;
        insert_transaction(&db, 5, 1, 1, "failed", "payment", "2024-01-01 10:00:00").await;
        insert_transaction(&db, 6, 1, 1, "on-hold", "payment", "2024-01-01 10:00:00").await;

        let stats = transaction_stats(&db, "wp_").await.unwrap();
        assert_eq!(
            stats,
            TransactionStats {
                total: 5,
                completed: 2,
                pending: 1,
                refunded: 1,
                other: 1,
            }
        );

        assert_eq!(
            transaction_stats(&db, "none_").await.unwrap(),
            TransactionStats::default()
        );
    }
}
