//! NATS JetStream implementation of the producer and consumer traits

use crate::{validate_key, BrokerConfig, BusError, BusResult, EventConsumer, EventProducer, Message};
use async_nats::jetstream::{self, consumer::pull, consumer::AckPolicy, stream};
use async_nats::Client;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Connect to the configured brokers
async fn connect(config: &BrokerConfig) -> BusResult<Client> {
    config.validate()?;

    let addrs = config.brokers.join(",");
    async_nats::connect(addrs.as_str())
        .await
        .map_err(|e| BusError::ConnectionError(e.to_string()))
}

/// JetStream stream names may not contain dots
fn stream_name(topic: &str) -> String {
    topic.replace('.', "_").to_uppercase()
}

/// Look the topic's stream up, creating it when missing
///
/// Safe to call from every producer and consumer at startup: a concurrent
/// creator winning the race is resolved by reading the stream again.
async fn ensure_stream(js: &jetstream::Context, topic: &str) -> BusResult<stream::Stream> {
    let name = stream_name(topic);

    if let Ok(existing) = js.get_stream(&name).await {
        return Ok(existing);
    }

    let config = stream::Config {
        name: name.clone(),
        subjects: vec![format!("{topic}.>")],
        ..Default::default()
    };

    match js.create_stream(config).await {
        Ok(created) => {
            tracing::info!(stream = %name, topic = %topic, "Created JetStream stream");
            Ok(created)
        }
        Err(create_err) => js.get_stream(&name).await.map_err(|_| BusError::TopicError {
            topic: topic.to_string(),
            reason: create_err.to_string(),
        }),
    }
}

/// Producer publishing to `<topic>.<key>` on a JetStream stream
///
/// # Example
/// ```rust,no_run
/// use event_bus::{BrokerConfig, EventProducer, NatsProducer};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = BrokerConfig::new(vec!["nats://localhost:4222".into()], "auth.events");
/// let producer = NatsProducer::connect(&config).await?;
/// producer.publish("UserCreated", br#"{"id":1,"email":"a@b.com"}"#.to_vec()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NatsProducer {
    js: jetstream::Context,
    topic: String,
}

impl NatsProducer {
    /// Connect and make sure the topic's stream exists
    ///
    /// Fails fast when the broker list or topic is empty.
    pub async fn connect(config: &BrokerConfig) -> BusResult<Self> {
        let client = connect(config).await?;
        let js = jetstream::new(client);
        ensure_stream(&js, &config.topic).await?;

        tracing::info!(topic = %config.topic, "NATS producer initialized");

        Ok(Self {
            js,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl EventProducer for NatsProducer {
    async fn publish(&self, key: &str, value: Vec<u8>) -> BusResult<()> {
        validate_key(key)?;

        let subject = format!("{}.{}", self.topic, key);
        let size = value.len();

        let ack = self
            .js
            .publish(subject.clone(), value.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        // Wait for the stream to persist the message
        let ack = ack
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        tracing::debug!(
            subject = %subject,
            sequence = ack.sequence,
            value_size = size,
            "NATS message published"
        );

        Ok(())
    }
}

/// Tuning for the durable consumer backing a consumer group
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// How long the broker waits for a commit before redelivering
    pub ack_wait: Duration,
    /// Upper bound of delivered-but-uncommitted messages across the group.
    /// `1` keeps strict delivery order; raise it when scaling out.
    pub max_ack_pending: i64,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            ack_wait: Duration::from_secs(30),
            max_ack_pending: 1,
        }
    }
}

/// Consumer reading from a durable JetStream pull consumer
///
/// The durable name is the consumer group: processes sharing it split the
/// stream between them. [`EventConsumer::commit`] acks the delivered
/// JetStream messages; anything not acked within `ack_wait` is redelivered.
pub struct NatsConsumer {
    topic: String,
    subject_prefix: String,
    consumer: jetstream::consumer::PullConsumer,
    messages: tokio::sync::Mutex<BoxStream<'static, Result<jetstream::Message, String>>>,
    // Delivered and not yet committed, keyed by stream sequence
    in_flight: Mutex<HashMap<u64, jetstream::Message>>,
}

impl NatsConsumer {
    pub async fn connect(
        config: &BrokerConfig,
        group: &str,
        options: &ConsumerOptions,
    ) -> BusResult<Self> {
        if group.trim().is_empty() {
            return Err(BusError::ConfigError("no consumer group provided".to_string()));
        }
        if group.contains('.') || validate_key(group).is_err() {
            return Err(BusError::ConfigError(format!(
                "invalid consumer group: {group:?}"
            )));
        }

        let client = connect(config).await?;
        let js = jetstream::new(client);
        let stream = ensure_stream(&js, &config.topic).await?;

        let consumer = stream
            .get_or_create_consumer(
                group,
                pull::Config {
                    durable_name: Some(group.to_string()),
                    filter_subject: format!("{}.>", config.topic),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: options.ack_wait,
                    max_ack_pending: options.max_ack_pending,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;

        let messages = subscribe(&consumer)
            .await
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;

        tracing::info!(topic = %config.topic, group = %group, "NATS consumer initialized");

        Ok(Self {
            topic: config.topic.clone(),
            subject_prefix: format!("{}.", config.topic),
            consumer,
            messages: tokio::sync::Mutex::new(messages),
            in_flight: Mutex::new(HashMap::new()),
        })
    }
}

async fn subscribe(
    consumer: &jetstream::consumer::PullConsumer,
) -> Result<BoxStream<'static, Result<jetstream::Message, String>>, String> {
    Ok(consumer
        .messages()
        .await
        .map_err(|e| e.to_string())?
        .map(|item| item.map_err(|e| e.to_string()))
        .boxed())
}

#[async_trait]
impl EventConsumer for NatsConsumer {
    async fn read(&self, cancel: &CancellationToken) -> BusResult<Message> {
        let mut messages = self.messages.lock().await;

        let msg = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(BusError::Cancelled),
                next = messages.next() => next,
            };

            match next {
                Some(Ok(msg)) => break msg,
                Some(Err(e)) => return Err(BusError::ReadError(e)),
                None => {
                    // The pull subscription ended; the durable consumer keeps
                    // its position, so a fresh subscription resumes from it.
                    tracing::warn!(topic = %self.topic, "NATS message stream closed, resubscribing");
                    *messages = subscribe(&self.consumer).await.map_err(BusError::ReadError)?;
                }
            }
        };

        let offset = msg
            .info()
            .map_err(|e| BusError::ReadError(e.to_string()))?
            .stream_sequence;

        let key = msg
            .subject
            .as_str()
            .strip_prefix(&self.subject_prefix)
            .unwrap_or(msg.subject.as_str())
            .to_string();

        let out = Message::new(self.topic.clone(), key, msg.payload.to_vec(), offset);

        tracing::debug!(offset = offset, key = %out.key, "NATS message read");

        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(offset, msg);

        Ok(out)
    }

    async fn commit(&self, messages: &[Message]) -> BusResult<()> {
        let (pending, missing): (Vec<_>, Vec<_>) = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            messages
                .iter()
                .map(|m| (m.offset, in_flight.remove(&m.offset)))
                .partition(|(_, delivered)| delivered.is_some())
        };

        for (offset, delivered) in pending {
            if let Some(delivered) = delivered {
                delivered
                    .double_ack()
                    .await
                    .map_err(|e| BusError::CommitError(format!("offset {offset}: {e}")))?;
            }
        }

        if !missing.is_empty() {
            let offsets: Vec<u64> = missing.into_iter().map(|(offset, _)| offset).collect();
            return Err(BusError::CommitError(format!(
                "no delivered message for offsets {offsets:?}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: the connect tests require a running NATS server with JetStream
    // For CI, use InMemoryBus tests instead
    // For manual testing: docker run -p 4222:4222 nats:2.10-alpine -js

    #[test]
    fn test_stream_name() {
        assert_eq!(stream_name("auth.events"), "AUTH_EVENTS");
        assert_eq!(stream_name("users"), "USERS");
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_config() {
        let no_brokers = BrokerConfig::new(vec![], "auth.events");
        assert!(matches!(
            NatsProducer::connect(&no_brokers).await,
            Err(BusError::ConfigError(_))
        ));

        let no_topic = BrokerConfig::new(vec!["nats://localhost:4222".into()], "");
        assert!(matches!(
            NatsConsumer::connect(&no_topic, "group", &ConsumerOptions::default()).await,
            Err(BusError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_consumer_rejects_invalid_group() {
        let config = BrokerConfig::new(vec!["nats://localhost:4222".into()], "auth.events");
        for group in ["", "has.dot", "has space"] {
            assert!(matches!(
                NatsConsumer::connect(&config, group, &ConsumerOptions::default()).await,
                Err(BusError::ConfigError(_))
            ));
        }
    }

    #[tokio::test]
    #[ignore] // Requires NATS server with JetStream
    async fn test_nats_publish_read_commit() {
        let config = BrokerConfig::new(
            vec!["nats://localhost:4222".into()],
            format!("test.relay{}", std::process::id()),
        );
        let producer = NatsProducer::connect(&config).await.unwrap();
        let consumer = NatsConsumer::connect(&config, "test-group", &ConsumerOptions::default())
            .await
            .unwrap();

        producer
            .publish("UserCreated", b"test message".to_vec())
            .await
            .unwrap();

        let msg = tokio::time::timeout(
            Duration::from_secs(5),
            consumer.read(&CancellationToken::new()),
        )
        .await
        .expect("timeout waiting for message")
        .unwrap();

        assert_eq!(msg.key, "UserCreated");
        assert_eq!(msg.value, b"test message");
        consumer.commit(&[msg]).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires NATS server with JetStream
    async fn test_read_resubscribes_after_stream_ends() {
        let config = BrokerConfig::new(
            vec!["nats://localhost:4222".into()],
            format!("test.resub{}", std::process::id()),
        );
        let producer = NatsProducer::connect(&config).await.unwrap();
        let consumer = NatsConsumer::connect(&config, "test-group", &ConsumerOptions::default())
            .await
            .unwrap();

        // Simulate the pull subscription ending
        *consumer.messages.lock().await = futures::stream::empty().boxed();

        producer
            .publish("UserCreated", b"after close".to_vec())
            .await
            .unwrap();

        let msg = tokio::time::timeout(
            Duration::from_secs(5),
            consumer.read(&CancellationToken::new()),
        )
        .await
        .expect("timeout waiting for message")
        .unwrap();

        assert_eq!(msg.value, b"after close");
        consumer.commit(&[msg]).await.unwrap();
    }
}
