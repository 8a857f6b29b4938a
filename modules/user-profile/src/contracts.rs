//! Events this service consumes, as published by identity-auth

use serde::{Deserialize, Serialize};

/// `UserCreated` payload, version 1
///
/// Both fields are required. Unknown fields are ignored so the producer can
/// add fields without breaking this consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreatedV1 {
    pub id: i64,
    pub email: String,
}
