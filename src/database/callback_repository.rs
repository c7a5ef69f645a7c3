use crate::database::error::DatabaseError;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Acquirer callback as received, kept for audit
#[derive(Debug, Clone, FromRow)]
pub struct CallbackEvent {
    pub id: String,
    pub route: String,
    pub reference: Option<String>,
    pub payload: serde_json::Value,
    pub outcome: Option<String>,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Callback audit log
pub struct CallbackRepository {
    pool: PgPool,
}

impl CallbackRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a received callback before it is processed
    pub async fn log_event(
        &self,
        route: &str,
        reference: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<CallbackEvent, DatabaseError> {
        let event_id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, CallbackEvent>(
            "INSERT INTO callback_events (id, route, reference, payload, created_at)
             VALUES ($1, $2, $3, $4, NOW())
             RETURNING id, route, reference, payload, outcome, error, created_at, processed_at",
        )
        .bind(&event_id)
        .bind(route)
        .bind(reference)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Mark a callback as processed with its outcome
    pub async fn mark_processed(
        &self,
        event_id: &str,
        outcome: serde_json::Value,
    ) -> Result<CallbackEvent, DatabaseError> {
        sqlx::query_as::<_, CallbackEvent>(
            "UPDATE callback_events SET outcome = $2, processed_at = NOW() WHERE id = $1
             RETURNING id, route, reference, payload, outcome, error, created_at, processed_at",
        )
        .bind(event_id)
        .bind(outcome.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Record why a callback was rejected
    pub async fn record_failure(
        &self,
        event_id: &str,
        error: &str,
    ) -> Result<CallbackEvent, DatabaseError> {
        sqlx::query_as::<_, CallbackEvent>(
            "UPDATE callback_events SET error = $2, processed_at = NOW() WHERE id = $1
             RETURNING id, route, reference, payload, outcome, error, created_at, processed_at",
        )
        .bind(event_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Callbacks received for a reference, newest first
    pub async fn find_by_reference(
        &self,
        reference: &str,
        limit: i64,
    ) -> Result<Vec<CallbackEvent>, DatabaseError> {
        sqlx::query_as::<_, CallbackEvent>(
            "SELECT id, route, reference, payload, outcome, error, created_at, processed_at
             FROM callback_events
             WHERE reference = $1
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(reference)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
