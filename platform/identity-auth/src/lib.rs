//! Identity/auth service core
//!
//! Credentials live in SQLite next to a transactional outbox. Registering a
//! user writes the credential and its `UserCreated` event in one
//! transaction; the [`events::drainer::OutboxDrainer`] publishes pending
//! events to the event bus in the background.

pub mod config;
pub mod db;
pub mod events;
pub mod models;
pub mod routes;
pub mod storage;
