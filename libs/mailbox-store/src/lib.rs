//! Paged retrieval of durably stored offline messages.
//!
//! Only payloads flagged "delivery-required" at publish time are persisted
//! here; the gateway drains them on reconnect (see the `offline-replay`
//! task in the `gateway` crate) and never writes to this store itself
//! beyond that reserved extension point.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("mailbox store error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct OfflineMessage {
    pub id: i64,
    pub user_id: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

pub struct MailboxListParams<'a> {
    pub user_id: &'a str,
    pub offset: i64,
    pub limit: i64,
}

/// Port seam over the durable mailbox, so callers that only need paging
/// behavior (e.g. offline replay) can be exercised against an in-memory
/// fake instead of a live `PgPool`.
#[async_trait::async_trait]
pub trait MailboxPort: Send + Sync {
    async fn list_unread_offline_delivery_required_messages(
        &self,
        params: MailboxListParams<'_>,
    ) -> Result<Vec<OfflineMessage>, MailboxError>;
}

#[derive(Clone)]
pub struct MailboxStore {
    pool: PgPool,
}

#[async_trait::async_trait]
impl MailboxPort for MailboxStore {
    async fn list_unread_offline_delivery_required_messages(
        &self,
        params: MailboxListParams<'_>,
    ) -> Result<Vec<OfflineMessage>, MailboxError> {
        MailboxStore::list_unread_offline_delivery_required_messages(self, params).await
    }
}

impl MailboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns at most `limit` unread delivery-required messages for the
    /// user, **newest first** — callers that need replay order must reverse
    /// the accumulated batch themselves.
    pub async fn list_unread_offline_delivery_required_messages(
        &self,
        params: MailboxListParams<'_>,
    ) -> Result<Vec<OfflineMessage>, MailboxError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, payload, created_at
            FROM offline_mailbox
            WHERE user_id = $1 AND delivery_required = TRUE AND delivered_at IS NULL
            ORDER BY created_at DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(params.user_id)
        .bind(params.offset)
        .bind(params.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OfflineMessage {
                id: row.get("id"),
                user_id: row.get("user_id"),
                payload: row.get("payload"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Persists a delivery-required payload for later replay. This is the
    /// reserved extension the outbound dispatcher's "owner-is-me but no
    /// local socket" branch does not yet call (see `gateway::dispatch`).
    pub async fn store_delivery_required(
        &self,
        user_id: &str,
        payload: &[u8],
        ttl: std::time::Duration,
    ) -> Result<(), MailboxError> {
        sqlx::query(
            r#"
            INSERT INTO offline_mailbox (user_id, payload, delivery_required, created_at, expires_at)
            VALUES ($1, $2, TRUE, now(), now() + $3::interval)
            "#,
        )
        .bind(user_id)
        .bind(payload)
        .bind(format!("{} seconds", ttl.as_secs()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_carry_offset_and_limit_through() {
        let params = MailboxListParams {
            user_id: "U1",
            offset: 10,
            limit: 10,
        };
        assert_eq!(params.offset, 10);
        assert_eq!(params.limit, 10);
    }
}
