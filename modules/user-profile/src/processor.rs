//! Applying consumed events to the profile projection

use crate::contracts::UserCreatedV1;
use crate::models::User;
use crate::storage::StorageError;
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_NAME: &str = "no name";
pub const DEFAULT_SURNAME: &str = "no surname";

/// What an apply did to the projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    /// Redelivery of an event that was already applied
    AlreadyExists,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid event: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl ProcessError {
    /// Whether retrying the same payload can never succeed
    pub fn is_permanent(&self) -> bool {
        matches!(self, ProcessError::Decode(_) | ProcessError::Invalid(_))
    }
}

/// Applies one message payload
///
/// Implementations must be idempotent: applying the same payload twice
/// leaves the same state as applying it once, and reports success both times.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn apply(&self, payload: &[u8]) -> Result<Applied, ProcessError>;
}

/// Profile writes needed by [`UserCreatedProcessor`]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Create a profile; [`StorageError::UserExists`] if the id is taken
    async fn create_user(&self, user: &User) -> Result<(), StorageError>;
}

/// Creates a placeholder profile for every registered user
pub struct UserCreatedProcessor {
    store: Arc<dyn ProfileStore>,
}

impl UserCreatedProcessor {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventProcessor for UserCreatedProcessor {
    async fn apply(&self, payload: &[u8]) -> Result<Applied, ProcessError> {
        let event: UserCreatedV1 = serde_json::from_slice(payload)?;

        if event.id <= 0 {
            return Err(ProcessError::Invalid(format!("user id must be positive, got {}", event.id)));
        }
        if event.email.trim().is_empty() {
            return Err(ProcessError::Invalid("email is empty".to_string()));
        }

        let user = User {
            id: event.id,
            email: event.email,
            name: DEFAULT_NAME.to_string(),
            surname: DEFAULT_SURNAME.to_string(),
            avatar: Vec::new(),
        };

        match self.store.create_user(&user).await {
            Ok(()) => {
                tracing::info!(user_id = user.id, "Profile created");
                Ok(Applied::Created)
            }
            Err(StorageError::UserExists) => {
                tracing::debug!(user_id = user.id, "Profile already exists, skipping");
                Ok(Applied::AlreadyExists)
            }
            Err(e) => Err(ProcessError::Storage(e)),
        }
    }
}
