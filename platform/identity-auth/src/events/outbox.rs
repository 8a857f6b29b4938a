use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};

/// Relay state of an outbox row
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum EventStatus {
    New,
    Sent,
}

/// An event recorded in the outbox
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OutboxEvent {
    pub id: i64,
    pub event_type: String,
    /// JSON document, published verbatim
    pub payload: String,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

/// Record an event in the outbox
///
/// Takes the transaction that performs the domain change the event
/// describes, so the event exists if and only if that change is committed.
/// The caller propagates any error with `?`; dropping the transaction rolls
/// the domain change back with it.
pub async fn record_event<T: Serialize>(
    tx: &mut Transaction<'_, Sqlite>,
    event_type: &str,
    payload: &T,
) -> Result<i64, sqlx::Error> {
    let payload = serde_json::to_string(payload).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let id = sqlx::query(
        r#"
        INSERT INTO events_outbox (event_type, payload)
        VALUES (?, ?)
        "#,
    )
    .bind(event_type)
    .bind(&payload)
    .execute(&mut **tx)
    .await?
    .last_insert_rowid();

    tracing::debug!(event_id = id, event_type = %event_type, "Event recorded in outbox");

    Ok(id)
}

/// Fetch the oldest event that has not been sent yet
///
/// Age is the id order, which is the commit order of the inserts;
/// `created_at` follows the wall clock and may step backwards.
pub async fn fetch_oldest_new(db: &SqlitePool) -> Result<Option<OutboxEvent>, sqlx::Error> {
    sqlx::query_as::<_, OutboxEvent>(
        r#"
        SELECT id, event_type, payload, status, created_at
        FROM events_outbox
        WHERE status = 'new'
        ORDER BY id ASC
        LIMIT 1
        "#,
    )
    .fetch_optional(db)
    .await
}

/// Mark an event as sent
///
/// Returns [`sqlx::Error::RowNotFound`] when no event has this id.
pub async fn mark_sent(db: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE events_outbox
        SET status = 'sent', sent_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }

    Ok(())
}
