//! Inbound relay: broker → processor → commit
//!
//! A message is committed only after the processor reported success, so a
//! crash or failure before that point leads to redelivery. A message that
//! failed stays pending and is retried before anything newer is read; reading
//! past it would let the next commit acknowledge it implicitly.

use crate::processor::{Applied, EventProcessor};
use crate::storage::StorageError;
use async_trait::async_trait;
use event_bus::consumer_retry::RetryConfig;
use event_bus::{BusError, EventConsumer, Message};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Where messages go once their retry budget is used up
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn dead_letter(&self, message: &Message, error: &str, attempts: u32)
        -> Result<(), StorageError>;
}

/// Result of a single relay tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Committed { offset: u64 },
    ReadFailed,
    /// Not committed; retried next tick
    ProcessFailed { offset: u64, attempts: u32 },
    /// Given up on, recorded and committed
    DeadLettered { offset: u64 },
    CommitFailed { offset: u64 },
    Cancelled,
}

struct Pending {
    message: Message,
    attempts: u32,
}

pub struct InboundRelay {
    consumer: Arc<dyn EventConsumer>,
    processor: Arc<dyn EventProcessor>,
    dead_letters: Option<Arc<dyn DeadLetterStore>>,
    retry: RetryConfig,
    pending: Option<Pending>,
}

impl InboundRelay {
    pub fn new(
        consumer: Arc<dyn EventConsumer>,
        processor: Arc<dyn EventProcessor>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            consumer,
            processor,
            dead_letters: None,
            retry,
            pending: None,
        }
    }

    /// Dead-letter permanently failing messages after `retry.max_attempts`
    ///
    /// Without a dead-letter store every failure is retried indefinitely.
    pub fn with_dead_letters(mut self, store: Arc<dyn DeadLetterStore>) -> Self {
        self.dead_letters = Some(store);
        self
    }

    /// Offset of the message awaiting a retry, if any
    pub fn pending_offset(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.message.offset)
    }

    /// Process one message
    ///
    /// Only the read is interrupted by `cancel`; processing and committing
    /// always run to completion once started.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> RelayOutcome {
        let (message, attempts) = match self.pending.take() {
            Some(pending) => (pending.message, pending.attempts),
            None => match self.consumer.read(cancel).await {
                Ok(message) => (message, 0),
                Err(BusError::Cancelled) => return RelayOutcome::Cancelled,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read message");
                    return RelayOutcome::ReadFailed;
                }
            },
        };

        let offset = message.offset;

        match self.processor.apply(&message.value).await {
            Ok(applied) => {
                tracing::debug!(
                    offset = offset,
                    key = %message.key,
                    duplicate = applied == Applied::AlreadyExists,
                    "Message processed"
                );
            }
            Err(e) => {
                let attempts = attempts + 1;

                if e.is_permanent() && self.retry.is_exhausted(attempts) {
                    if let Some(store) = &self.dead_letters {
                        match store.dead_letter(&message, &e.to_string(), attempts).await {
                            Ok(()) => {
                                return if self.commit(&message).await {
                                    RelayOutcome::DeadLettered { offset }
                                } else {
                                    RelayOutcome::CommitFailed { offset }
                                };
                            }
                            Err(dlq_err) => {
                                tracing::error!(
                                    offset = offset,
                                    error = %dlq_err,
                                    "Failed to record dead letter, keeping message pending"
                                );
                            }
                        }
                    }
                }

                tracing::error!(
                    offset = offset,
                    key = %message.key,
                    attempts = attempts,
                    permanent = e.is_permanent(),
                    error = %e,
                    "Failed to process message, not committing"
                );

                self.pending = Some(Pending { message, attempts });
                return RelayOutcome::ProcessFailed { offset, attempts };
            }
        }

        if self.commit(&message).await {
            RelayOutcome::Committed { offset }
        } else {
            RelayOutcome::CommitFailed { offset }
        }
    }

    async fn commit(&self, message: &Message) -> bool {
        match self.consumer.commit(std::slice::from_ref(message)).await {
            Ok(()) => true,
            Err(e) => {
                // Applied but not acknowledged: the broker redelivers it and
                // the idempotent processor absorbs the repeat.
                tracing::error!(offset = message.offset, error = %e, "Failed to commit message");
                false
            }
        }
    }

    /// Relay messages until `cancel` fires
    ///
    /// Runs ticks back to back. After a failed read, process or commit the
    /// loop waits an exponentially growing, cancellable back-off first.
    pub async fn run(&mut self, cancel: CancellationToken) {
        tracing::info!("Starting inbound relay");

        let mut broker_failures: u32 = 0;

        while !cancel.is_cancelled() {
            let delay = match self.tick(&cancel).await {
                RelayOutcome::Cancelled => break,
                RelayOutcome::Committed { .. } | RelayOutcome::DeadLettered { .. } => {
                    broker_failures = 0;
                    None
                }
                RelayOutcome::ReadFailed | RelayOutcome::CommitFailed { .. } => {
                    broker_failures = broker_failures.saturating_add(1);
                    Some(self.retry.backoff_for(broker_failures))
                }
                RelayOutcome::ProcessFailed { attempts, .. } => Some(self.retry.backoff_for(attempts)),
            };

            if let Some(delay) = delay {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        tracing::info!("Inbound relay stopped");
    }
}
