//! Typed key/value operations against the shared presence cache.
//!
//! Every operation is a thin, typed wrapper around a handful of Redis
//! commands so the gateway core never has to know which driver backs the
//! cache. Transport failures bubble up as [`PresenceError`]; it is the
//! caller's job to decide whether that failure is fatal (admission) or
//! merely advisory (steady-state notification suppression).

use redis::AsyncCommands;
use redis_utils::{with_timeout, SharedConnectionManager};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("presence store transport error: {0}")]
    Transport(#[from] redis::RedisError),
}

/// Port seam over the presence cache, narrowed to what offline-replay and
/// online-notify need, so those can be exercised against an in-memory fake.
#[async_trait::async_trait]
pub trait PresencePort: Send + Sync {
    async fn get_int64(&self, key: &str) -> Result<Option<i64>, PresenceError>;
    async fn set_int64(&self, key: &str, value: i64, ttl_secs: u64) -> Result<(), PresenceError>;
}

#[derive(Clone)]
pub struct PresenceStore {
    manager: SharedConnectionManager,
}

#[async_trait::async_trait]
impl PresencePort for PresenceStore {
    async fn get_int64(&self, key: &str) -> Result<Option<i64>, PresenceError> {
        PresenceStore::get_int64(self, key).await
    }

    async fn set_int64(&self, key: &str, value: i64, ttl_secs: u64) -> Result<(), PresenceError> {
        PresenceStore::set_int64(self, key, value, ttl_secs).await
    }
}

impl PresenceStore {
    pub fn new(manager: SharedConnectionManager) -> Self {
        Self { manager }
    }

    /// `ttl_secs == 0` means no expiry.
    pub async fn set_string(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), PresenceError> {
        let mut conn = self.manager.lock().await;
        with_timeout(async {
            if ttl_secs == 0 {
                conn.set::<_, _, ()>(key, value).await
            } else {
                conn.set_ex::<_, _, ()>(key, value, ttl_secs).await
            }
        })
        .await?;
        Ok(())
    }

    pub async fn set_int64(
        &self,
        key: &str,
        value: i64,
        ttl_secs: u64,
    ) -> Result<(), PresenceError> {
        self.set_string(key, &value.to_string(), ttl_secs).await
    }

    pub async fn set_int(&self, key: &str, value: i32, ttl_secs: u64) -> Result<(), PresenceError> {
        self.set_int64(key, value as i64, ttl_secs).await
    }

    pub async fn get_string(&self, key: &str) -> Result<Option<String>, PresenceError> {
        let mut conn = self.manager.lock().await;
        let value: Option<String> = with_timeout(async { conn.get(key).await }).await?;
        Ok(value)
    }

    pub async fn get_int64(&self, key: &str) -> Result<Option<i64>, PresenceError> {
        Ok(self
            .get_string(key)
            .await?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    pub async fn get_int(&self, key: &str) -> Result<Option<i32>, PresenceError> {
        Ok(self
            .get_string(key)
            .await?
            .and_then(|v| v.parse::<i32>().ok()))
    }
}

/// Builds the per-user presence keyspace, e.g. `gcp_ags_prod_user_123_online`.
pub struct PresenceKeys<'a> {
    pub env: &'a str,
    pub user_id: &'a str,
}

impl<'a> PresenceKeys<'a> {
    fn prefix(&self) -> String {
        format!("gcp_ags_{}_user_{}_", self.env, self.user_id)
    }

    pub fn online(&self) -> String {
        format!("{}online", self.prefix())
    }

    pub fn online_ts(&self) -> String {
        format!("{}online_ts", self.prefix())
    }

    pub fn online_notify_ts(&self) -> String {
        format!("{}online_notify_ts", self.prefix())
    }

    pub fn conn(&self) -> String {
        format!("{}conn", self.prefix())
    }

    pub fn offline_message_cnt(&self) -> String {
        format!("{}offline_message_cnt", self.prefix())
    }
}
