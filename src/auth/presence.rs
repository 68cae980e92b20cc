//! Online presence tracking on top of a TTL key-value store
//!
//! Every authenticated request refreshes `online:<user_id>` with a fixed TTL.
//! Entries are never deleted explicitly; they simply expire.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::error::StoreError;

pub const PRESENCE_PREFIX: &str = "online:";
pub const PRESENCE_TTL: Duration = Duration::from_secs(5 * 60);

/// Minimal TTL key-value capability needed for presence
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Live keys starting with `prefix`
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Redis-backed store
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }

    /// Test Redis connection
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", prefix))
            .query_async(&mut conn)
            .await?;
        Ok(keys)
    }
}

/// Process-local store with lazy expiry. Used when no Redis URL is configured.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .iter()
            .filter(|(key, (_, expires_at))| key.starts_with(prefix) && *expires_at > now)
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// Marks users online and lists who is online
#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    timeout: Duration,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
        Self {
            store,
            ttl: PRESENCE_TTL,
            timeout,
        }
    }

    pub async fn touch(&self, user_id: &str) -> Result<(), StoreError> {
        let key = format!("{}{}", PRESENCE_PREFIX, user_id);
        tokio::time::timeout(self.timeout, self.store.set_ex(&key, "1", self.ttl))
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    /// Online user ids, sorted
    pub async fn list_online(&self) -> Result<Vec<String>, StoreError> {
        let keys = tokio::time::timeout(self.timeout, self.store.keys_with_prefix(PRESENCE_PREFIX))
            .await
            .map_err(|_| StoreError::Timeout)??;

        let mut ids: Vec<String> = keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(PRESENCE_PREFIX).map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }
}
