//! Common test utilities for identity-auth integration tests
//!
//! Every test gets its own in-memory SQLite database, so tests are isolated
//! and can run in parallel.

#![allow(dead_code)]

use auth_rs::db;
use sqlx::SqlitePool;

/// Fresh in-memory database with the service schema applied
pub async fn setup_pool() -> SqlitePool {
    let pool = db::init_pool("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub async fn outbox_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM events_outbox")
        .fetch_one(pool)
        .await
        .expect("Failed to count outbox rows")
}

pub async fn user_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .expect("Failed to count users")
}

pub async fn status_of(pool: &SqlitePool, id: i64) -> String {
    sqlx::query_scalar("SELECT status FROM events_outbox WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("Failed to read event status")
}
