use crate::models::{DeadLetter, ProfileUpdate, User};
use crate::processor::ProfileStore;
use crate::relay::DeadLetterStore;
use async_trait::async_trait;
use event_bus::Message;
use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("user already exists")]
    UserExists,

    #[error("user not found")]
    UserNotFound,

    #[error("offset {0} does not fit a database integer")]
    OffsetOutOfRange(u64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// SQLite-backed profile store
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

    /// Insert a profile unless one with the same id exists
    ///
    /// Returns [`StorageError::UserExists`] and leaves the stored profile
    /// untouched when the id is taken.
    pub async fn create_user(&self, user: &User) -> Result<(), StorageError> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO users (id, email, name, surname, avatar)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.surname)
        .bind(&user.avatar)
        .fetch_optional(&self.db)
        .await?;

        match inserted {
            Some(_) => Ok(()),
            None => Err(StorageError::UserExists),
        }
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<User, StorageError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, surname, avatar
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StorageError::UserNotFound)
    }

    /// Replace name, surname and avatar of an existing profile
    ///
    /// The email is owned by identity-auth and never changes here.
    pub async fn update_user(&self, id: i64, update: &ProfileUpdate) -> Result<User, StorageError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = ?, surname = ?, avatar = ?
            WHERE id = ?
            RETURNING id, email, name, surname, avatar
            "#,
        )
        .bind(&update.name)
        .bind(&update.surname)
        .bind(&update.avatar)
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StorageError::UserNotFound)
    }

    /// Record a message that will not be processed
    pub async fn insert_dead_letter(
        &self,
        message: &Message,
        error: &str,
        attempts: u32,
    ) -> Result<i64, StorageError> {
        let offset =
            i64::try_from(message.offset).map_err(|_| StorageError::OffsetOutOfRange(message.offset))?;

        let id = sqlx::query(
            r#"
            INSERT INTO dead_letters (topic, message_key, message_offset, payload, error, attempts)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.topic)
        .bind(&message.key)
        .bind(offset)
        .bind(String::from_utf8_lossy(&message.value).into_owned())
        .bind(error)
        .bind(i64::from(attempts))
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    /// Dead letters, oldest first
    pub async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>, StorageError> {
        Ok(sqlx::query_as::<_, DeadLetter>(
            r#"
            SELECT id, topic, message_key, message_offset, payload, error, attempts, failed_at
            FROM dead_letters
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?)
    }
}

#[async_trait]
impl ProfileStore for Storage {
    async fn create_user(&self, user: &User) -> Result<(), StorageError> {
        Storage::create_user(self, user).await
    }
}

#[async_trait]
impl DeadLetterStore for Storage {
    async fn dead_letter(
        &self,
        message: &Message,
        error: &str,
        attempts: u32,
    ) -> Result<(), StorageError> {
        let id = self.insert_dead_letter(message, error, attempts).await?;

        tracing::warn!(
            dead_letter_id = id,
            topic = %message.topic,
            offset = message.offset,
            attempts = attempts,
            error = %error,
            "Message moved to dead letters"
        );

        Ok(())
    }
}
