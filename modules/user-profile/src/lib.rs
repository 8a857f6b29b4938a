//! User-profile service core
//!
//! Keeps a profile projection of the users registered with identity-auth.
//! The [`relay::InboundRelay`] reads `UserCreated` events from the event bus,
//! applies them through the [`processor::UserCreatedProcessor`] and commits
//! each message only once its change is stored. Users then replace the
//! placeholder name, surname and avatar through the `/api/users` routes.

pub mod config;
pub mod contracts;
pub mod db;
pub mod models;
pub mod processor;
pub mod profile;
pub mod relay;
pub mod routes;
pub mod storage;
