//! Fixtures shared by unit tests

use mpbi_common::db::create_service_tables;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

/// In-memory pool with the service tables only
pub async fn service_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_service_tables(&pool).await.unwrap();
    pool
}

/// In-memory pool with the service tables plus `wp_` MemberPress tables
pub async fn memberpress_pool() -> SqlitePool {
    let pool = service_pool().await;
    sqlx::query(
        r#"
        CREATE TABLE wp_mepr_transactions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            product_id INTEGER NOT NULL,
            amount TEXT NOT NULL DEFAULT '0.00',
            total TEXT NOT NULL DEFAULT '0.00',
            status TEXT NOT NULL,
            txn_type TEXT NOT NULL,
            trans_num TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("CREATE TABLE wp_users (ID INTEGER PRIMARY KEY, user_email TEXT NOT NULL)")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

pub async fn insert_transaction(
    pool: &SqlitePool,
    id: i64,
    user_id: i64,
    product_id: i64,
    status: &str,
    txn_type: &str,
    created_at: &str,
) {
    sqlx::query(
        r#"
        INSERT INTO wp_mepr_transactions
            (id, user_id, product_id, amount, total, status, txn_type, trans_num, created_at)
        VALUES (?, ?, ?, '10.00', '12.00', ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(product_id)
    .bind(status)
    .bind(txn_type)
    .bind(format!("mp-txn-{}", id))
    .bind(created_at)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn insert_user(pool: &SqlitePool, id: i64, email: &str) {
    sqlx::query("INSERT INTO wp_users (ID, user_email) VALUES (?, ?)")
        .bind(id)
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
}
