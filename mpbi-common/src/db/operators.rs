//! Operator accounts allowed to drive invoice generation

use crate::Result;
use sqlx::SqlitePool;

/// Create or update an operator and its manage capability
pub async fn upsert_operator(db: &SqlitePool, username: &str, can_manage: bool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO operators (username, can_manage) VALUES (?, ?)
        ON CONFLICT(username) DO UPDATE SET can_manage = excluded.can_manage
        "#,
    )
    .bind(username)
    .bind(can_manage as i64)
    .execute(db)
    .await?;

    Ok(())
}

/// Remove an operator. Returns whether a row was deleted.
pub async fn remove_operator(db: &SqlitePool, username: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM operators WHERE username = ?")
        .bind(username)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::check_operator;
    use crate::db::create_service_tables;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_service_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_privileged_operator_passes_check() {
        let db = setup_test_db().await;
        upsert_operator(&db, "admin", true).await.unwrap();

        assert!(check_operator(&db, "admin").await.is_ok());
    }

    #[tokio::test]
    async fn test_unprivileged_and_unknown_operators_rejected() {
        let db = setup_test_db().await;
        upsert_operator(&db, "editor", false).await.unwrap();

        assert!(check_operator(&db, "editor").await.is_err());
        assert!(check_operator(&db, "nobody").await.is_err());
    }

    #[tokio::test]
    async fn test_capability_can_be_revoked() {
        let db = setup_test_db().await;
        upsert_operator(&db, "admin", true).await.unwrap();
        upsert_operator(&db, "admin", false).await.unwrap();
        assert!(check_operator(&db, "admin").await.is_err());

        assert!(remove_operator(&db, "admin").await.unwrap());
        assert!(!remove_operator(&db, "admin").await.unwrap());
    }
}
