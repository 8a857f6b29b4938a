//! # Event Bus
//!
//! Broker clients shared by the identity-auth service (producer side) and the
//! user-profile service (consumer side).
//!
//! ## Contracts
//!
//! - [`EventProducer::publish`] returns only after the broker acknowledged the
//!   message. There is no fire-and-forget path.
//! - [`EventConsumer::read`] suspends until a message is available or the
//!   caller's [`CancellationToken`] fires.
//! - [`EventConsumer::commit`] advances the consumer group's cursor. Nothing
//!   is acknowledged implicitly by reading.
//!
//! ## Implementations
//!
//! - **NatsProducer / NatsConsumer**: production implementation on NATS
//!   JetStream. A topic is a stream, a consumer group is a durable pull
//!   consumer and a commit is an explicit ack.
//! - **InMemoryBus**: test/dev implementation with an in-process topic log and
//!   per-group committed offsets.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{BrokerConfig, EventConsumer, EventProducer, InMemoryBus};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = InMemoryBus::new();
//! let config = BrokerConfig::new(vec!["memory".to_string()], "auth.events");
//!
//! let producer = bus.producer(&config)?;
//! producer.publish("UserCreated", br#"{"id":1,"email":"a@b.com"}"#.to_vec()).await?;
//!
//! let consumer = bus.consumer(&config, "user-service-group")?;
//! let cancel = CancellationToken::new();
//! let msg = consumer.read(&cancel).await?;
//! consumer.commit(&[msg]).await?;
//! # Ok(())
//! # }
//! ```

pub mod consumer_retry;
mod inmemory_bus;
mod nats_bus;
mod task;

pub use inmemory_bus::{InMemoryBus, InMemoryConsumer, InMemoryProducer};
pub use nats_bus::{ConsumerOptions, NatsConsumer, NatsProducer};
pub use task::BackgroundTask;

use async_trait::async_trait;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// A message read from a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The topic the message was read from
    pub topic: String,
    /// Message key (the event type, e.g. `UserCreated`)
    pub key: String,
    /// The message payload (raw bytes)
    pub value: Vec<u8>,
    /// Broker position of the message. Opaque outside the backend that
    /// produced it, but monotonically increasing within a topic.
    pub offset: u64,
}

impl Message {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, value: Vec<u8>, offset: u64) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            value,
            offset,
        }
    }
}

/// Errors that can occur when talking to the broker
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("invalid broker configuration: {0}")]
    ConfigError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("failed to ensure topic {topic}: {reason}")]
    TopicError { topic: String, reason: String },

    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to read message: {0}")]
    ReadError(String),

    #[error("failed to commit message: {0}")]
    CommitError(String),

    #[error("invalid message key: {0}")]
    InvalidKey(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Broker addresses and topic shared by producers and consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
}

impl BrokerConfig {
    pub fn new(brokers: Vec<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers,
            topic: topic.into(),
        }
    }

    /// Split a comma-separated broker list, dropping blank entries
    pub fn parse_brokers(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Fail fast on configuration that can never work
    pub fn validate(&self) -> BusResult<()> {
        if self.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(BusError::ConfigError("no brokers provided".to_string()));
        }
        if self.topic.trim().is_empty() {
            return Err(BusError::ConfigError("no topic provided".to_string()));
        }
        if !is_valid_token(&self.topic) {
            return Err(BusError::ConfigError(format!(
                "invalid topic name: {:?}",
                self.topic
            )));
        }
        Ok(())
    }
}

/// Message keys become subject tokens on NATS, so they follow the same rules
pub fn validate_key(key: &str) -> BusResult<()> {
    if key.is_empty() || !is_valid_token(key) {
        return Err(BusError::InvalidKey(format!("{key:?}")));
    }
    Ok(())
}

fn is_valid_token(s: &str) -> bool {
    !s.starts_with('.')
        && !s.ends_with('.')
        && !s.contains("..")
        && !s.chars().any(|c| c.is_whitespace() || c == '*' || c == '>')
}

/// Publish side of the broker
#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Publish `value` under `key` to the producer's topic
    ///
    /// Returns only after the broker has acknowledged receipt. Any error means
    /// the message must be considered not delivered and retried later.
    async fn publish(&self, key: &str, value: Vec<u8>) -> BusResult<()>;
}

/// Consume side of the broker, bound to one topic and one consumer group
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Wait for the next message
    ///
    /// Returns [`BusError::Cancelled`] as soon as `cancel` fires.
    async fn read(&self, cancel: &CancellationToken) -> BusResult<Message>;

    /// Acknowledge messages so they are not redelivered to this group
    async fn commit(&self, messages: &[Message]) -> BusResult<()>;
}

impl fmt::Debug for dyn EventProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventProducer")
    }
}

impl fmt::Debug for dyn EventConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventConsumer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_brokers() {
        assert_eq!(
            BrokerConfig::parse_brokers("nats://a:4222, nats://b:4222,,"),
            vec!["nats://a:4222".to_string(), "nats://b:4222".to_string()]
        );
        assert!(BrokerConfig::parse_brokers(" , ").is_empty());
    }

    #[test]
    fn test_validate_rejects_missing_brokers_or_topic() {
        let no_brokers = BrokerConfig::new(vec![], "auth.events");
        assert!(matches!(no_brokers.validate(), Err(BusError::ConfigError(_))));

        let blank_topic = BrokerConfig::new(vec!["nats://localhost:4222".into()], "  ");
        assert!(matches!(blank_topic.validate(), Err(BusError::ConfigError(_))));

        let wildcard_topic = BrokerConfig::new(vec!["nats://localhost:4222".into()], "auth.>");
        assert!(matches!(wildcard_topic.validate(), Err(BusError::ConfigError(_))));

        let ok = BrokerConfig::new(vec!["nats://localhost:4222".into()], "auth.events");
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("UserCreated").is_ok());
        assert!(validate_key("user.created").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("user created").is_err());
        assert!(validate_key("user.*").is_err());
        assert!(validate_key(".user").is_err());
    }
}
