//! In-memory broker for testing and development

use crate::{validate_key, BrokerConfig, BusError, BusResult, EventConsumer, EventProducer, Message};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Broker implementation using an in-process topic log
///
/// This implementation is suitable for:
/// - Unit tests (no external dependencies)
/// - Local development without Docker
/// - End-to-end tests that run both services in one process
///
/// Each topic is an append-only log; a message's offset is its index in the
/// log. Consumer groups track a committed offset. A consumer starts reading at
/// its group's committed offset, so anything that was read but never
/// committed is delivered again to the next consumer of that group, the same
/// way a restarted Kafka or JetStream consumer behaves.
///
/// # Example
/// ```rust
/// use event_bus::{BrokerConfig, EventConsumer, EventProducer, InMemoryBus};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
/// let config = BrokerConfig::new(vec!["memory".into()], "test.events");
///
/// let consumer = bus.consumer(&config, "group-a")?;
/// bus.producer(&config)?.publish("Created", b"hello".to_vec()).await?;
///
/// let msg = consumer.read(&CancellationToken::new()).await?;
/// assert_eq!(msg.key, "Created");
/// assert_eq!(msg.value, b"hello");
/// consumer.commit(&[msg]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBus {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    // Woken on every publish
    appended: Notify,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<Record>>,
    committed: HashMap<(String, String), u64>,
}

struct Record {
    key: String,
    value: Vec<u8>,
}

impl InMemoryBus {
    /// Create a new in-memory broker with no topics
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a producer for `config.topic`, creating the topic if missing
    pub fn producer(&self, config: &BrokerConfig) -> BusResult<InMemoryProducer> {
        config.validate()?;
        self.ensure_topic(&config.topic);

        Ok(InMemoryProducer {
            bus: self.clone(),
            topic: config.topic.clone(),
        })
    }

    /// Create a consumer for `config.topic` in consumer group `group`
    ///
    /// The consumer starts at the group's committed offset.
    pub fn consumer(&self, config: &BrokerConfig, group: &str) -> BusResult<InMemoryConsumer> {
        config.validate()?;
        if group.trim().is_empty() {
            return Err(BusError::ConfigError("no consumer group provided".to_string()));
        }
        self.ensure_topic(&config.topic);

        let position = self.committed_offset(&config.topic, group);

        Ok(InMemoryConsumer {
            bus: self.clone(),
            topic: config.topic.clone(),
            group: group.to_string(),
            position: Mutex::new(position),
        })
    }

    /// Snapshot of every message ever published to `topic`
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        let state = self.state();
        state
            .topics
            .get(topic)
            .map(|log| {
                log.iter()
                    .enumerate()
                    .map(|(idx, r)| Message::new(topic, r.key.clone(), r.value.clone(), idx as u64))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Offset of the next message the group would receive after a restart
    pub fn committed_offset(&self, topic: &str, group: &str) -> u64 {
        self.state()
            .committed
            .get(&(topic.to_string(), group.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn ensure_topic(&self, topic: &str) {
        self.state().topics.entry(topic.to_string()).or_default();
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // The lock is never held across an await or a panic-prone call, so a
        // poisoned mutex still holds consistent data.
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer handle returned by [`InMemoryBus::producer`]
#[derive(Clone)]
pub struct InMemoryProducer {
    bus: InMemoryBus,
    topic: String,
}

#[async_trait]
impl EventProducer for InMemoryProducer {
    async fn publish(&self, key: &str, value: Vec<u8>) -> BusResult<()> {
        validate_key(key)?;

        {
            let mut state = self.bus.state();
            state
                .topics
                .entry(self.topic.clone())
                .or_default()
                .push(Record {
                    key: key.to_string(),
                    value,
                });
        }

        self.bus.shared.appended.notify_waiters();
        Ok(())
    }
}

/// Consumer handle returned by [`InMemoryBus::consumer`]
pub struct InMemoryConsumer {
    bus: InMemoryBus,
    topic: String,
    group: String,
    // Fetch position of this consumer instance; not shared with the group
    position: Mutex<u64>,
}

impl InMemoryConsumer {
    fn try_next(&self) -> Option<Message> {
        let state = self.bus.state();
        let mut position = self
            .position
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let log = state.topics.get(&self.topic)?;
        let idx = usize::try_from(*position).ok()?;
        let record = log.get(idx)?;

        let msg = Message::new(
            self.topic.clone(),
            record.key.clone(),
            record.value.clone(),
            *position,
        );
        *position += 1;
        Some(msg)
    }
}

#[async_trait]
impl EventConsumer for InMemoryConsumer {
    async fn read(&self, cancel: &CancellationToken) -> BusResult<Message> {
        loop {
            // Register for wake-ups before checking the log so a publish that
            // lands in between is not missed.
            let appended = self.bus.shared.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(msg) = self.try_next() {
                return Ok(msg);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(BusError::Cancelled),
                _ = &mut appended => {}
            }
        }
    }

    async fn commit(&self, messages: &[Message]) -> BusResult<()> {
        if let Some(foreign) = messages.iter().find(|m| m.topic != self.topic) {
            return Err(BusError::CommitError(format!(
                "message from topic {} cannot be committed on {}",
                foreign.topic, self.topic
            )));
        }

        let Some(next) = messages.iter().map(|m| m.offset + 1).max() else {
            return Ok(());
        };

        let mut state = self.bus.state();
        let committed = state
            .committed
            .entry((self.topic.clone(), self.group.clone()))
            .or_insert(0);
        *committed = (*committed).max(next);

        Ok(())
    }
}
