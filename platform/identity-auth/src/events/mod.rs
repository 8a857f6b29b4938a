//! User lifecycle events and their relay to the event bus
//!
//! Events are written to the `events_outbox` table inside the transaction
//! that caused them ([`outbox::record_event`]) and published later by the
//! [`drainer::OutboxDrainer`].

pub mod drainer;
pub mod outbox;

use serde::{Deserialize, Serialize};

/// Event type (and message key) for a newly registered user
pub const USER_CREATED: &str = "UserCreated";

/// Payload of a [`USER_CREATED`] event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub id: i64,
    pub email: String,
}
