use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Profile projection of an auth user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    /// Id assigned by the auth service
    pub id: i64,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub avatar: Vec<u8>,
}

/// The user-editable part of a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: String,
    pub surname: String,
    /// Raw image bytes; empty clears the avatar
    pub avatar: Vec<u8>,
}

/// A message that was given up on after repeated permanent failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct DeadLetter {
    pub id: i64,
    pub topic: String,
    pub message_key: String,
    pub message_offset: i64,
    pub payload: String,
    pub error: String,
    pub attempts: i64,
    pub failed_at: DateTime<Utc>,
}
