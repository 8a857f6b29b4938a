use crate::events::outbox::OutboxEvent;
use crate::storage::StorageError;
use async_trait::async_trait;
use event_bus::EventProducer;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Outbox access needed by the drainer
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest event still waiting to be published
    async fn fetch_oldest_pending(&self) -> Result<Option<OutboxEvent>, StorageError>;

    async fn mark_sent(&self, id: i64) -> Result<(), StorageError>;
}

/// Result of a single drain tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing to publish
    Idle,
    Published { id: i64 },
    FetchFailed,
    /// Event left pending, retried next tick
    PublishFailed { id: i64 },
    /// Event reached the broker but is still pending, so it will be
    /// published again next tick
    MarkSentFailed { id: i64 },
}

/// Background publisher moving outbox events to the event bus
///
/// Each tick publishes at most one event, the oldest pending one, and only
/// marks it sent after the broker acknowledged it. Every failure ends the
/// tick and leaves the event pending, so delivery is at-least-once.
pub struct OutboxDrainer {
    store: Arc<dyn OutboxStore>,
    producer: Arc<dyn EventProducer>,
}

impl OutboxDrainer {
    pub fn new(store: Arc<dyn OutboxStore>, producer: Arc<dyn EventProducer>) -> Self {
        Self { store, producer }
    }

    pub async fn tick(&self) -> DrainOutcome {
        let event = match self.store.fetch_oldest_pending().await {
            Ok(Some(event)) => event,
            Ok(None) => return DrainOutcome::Idle,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch pending outbox event");
                return DrainOutcome::FetchFailed;
            }
        };

        let id = event.id;

        if let Err(e) = self
            .producer
            .publish(&event.event_type, event.payload.into_bytes())
            .await
        {
            tracing::error!(
                event_id = id,
                event_type = %event.event_type,
                error = %e,
                "Failed to publish event"
            );
            return DrainOutcome::PublishFailed { id };
        }

        if let Err(e) = self.store.mark_sent(id).await {
            tracing::error!(
                event_id = id,
                event_type = %event.event_type,
                error = %e,
                "Event published but not marked as sent, it will be published again"
            );
            return DrainOutcome::MarkSentFailed { id };
        }

        tracing::info!(
            event_id = id,
            event_type = %event.event_type,
            "Event published successfully"
        );

        DrainOutcome::Published { id }
    }

    /// Drain on a fixed period until `cancel` fires
    ///
    /// Ticks never overlap. Cancellation is observed between ticks only: a
    /// tick in progress always runs to completion and none starts after the
    /// token fired.
    pub async fn run(&self, period: Duration, cancel: CancellationToken) {
        tracing::info!(period_ms = period.as_millis() as u64, "Starting outbox drainer");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            self.tick().await;
        }

        tracing::info!("Outbox drainer stopped");
    }
}
