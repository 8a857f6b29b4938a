use crate::events::drainer::OutboxStore;
use crate::events::outbox::{self, OutboxEvent};
use crate::events::{UserCreated, USER_CREATED};
use crate::models::User;
use async_trait::async_trait;
use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("user already exists")]
    UserExists,

    #[error("user not found")]
    UserNotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// SQLite-backed credential store
#[derive(Debug, Clone)]
pub struct Storage {
    db: SqlitePool,
}

impl Storage {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Register a user and record the `UserCreated` event atomically
    ///
    /// Returns the new user's id. On a duplicate email nothing is written,
    /// neither the user nor the event.
    pub async fn save_user(&self, email: &str, pass_hash: &[u8]) -> Result<i64, StorageError> {
        let mut tx = self.db.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO users (email, pass_hash)
            VALUES (?, ?)
            "#,
        )
        .bind(email)
        .bind(pass_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StorageError::UserExists,
            other => StorageError::Database(other),
        })?
        .last_insert_rowid();

        let event = UserCreated {
            id,
            email: email.to_string(),
        };
        outbox::record_event(&mut tx, USER_CREATED, &event).await?;

        tx.commit().await?;

        tracing::info!(user_id = id, "User saved");

        Ok(id)
    }

    pub async fn user(&self, email: &str) -> Result<User, StorageError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, pass_hash
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StorageError::UserNotFound)
    }
}

#[async_trait]
impl OutboxStore for Storage {
    async fn fetch_oldest_pending(&self) -> Result<Option<OutboxEvent>, StorageError> {
        Ok(outbox::fetch_oldest_new(&self.db).await?)
    }

    async fn mark_sent(&self, id: i64) -> Result<(), StorageError> {
        Ok(outbox::mark_sent(&self.db, id).await?)
    }
}
