//! Common test utilities for user-profile integration tests
//!
//! Every test gets its own in-memory SQLite database and its own in-memory
//! broker.

#![allow(dead_code)]

use event_bus::{BrokerConfig, EventProducer, InMemoryBus};
use sqlx::SqlitePool;
use user_profile_rs::db;

pub const TOPIC: &str = "auth.events";
pub const GROUP: &str = "user-service-group";

pub async fn setup_pool() -> SqlitePool {
    let pool = db::init_pool("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub fn broker() -> BrokerConfig {
    BrokerConfig::new(vec!["memory".to_string()], TOPIC)
}

/// Publish `payload` under the `UserCreated` key
pub async fn publish(bus: &InMemoryBus, payload: &str) {
    bus.producer(&broker())
        .expect("Failed to create producer")
        .publish("UserCreated", payload.as_bytes().to_vec())
        .await
        .expect("Failed to publish");
}

pub async fn user_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .expect("Failed to count users")
}
