use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use redis::{Client as RedisClient, aio::MultiplexedConnection};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{
    client::clock::Clock,
    types::EntitlementDecision,
    utils::{constants::CACHE_KEY, error::EntitlementError},
};

/// Durable client-side key-value storage.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, EntitlementError>;
    async fn set(&self, key: &str, value: String) -> Result<(), EntitlementError>;
    async fn remove(&self, key: &str) -> Result<(), EntitlementError>;
}

#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, EntitlementError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), EntitlementError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), EntitlementError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// One JSON file per key under `dir`.
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl KvStore for FileKv {
    async fn get(&self, key: &str) -> Result<Option<String>, EntitlementError> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), EntitlementError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), EntitlementError> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct RedisKv {
    conn: MultiplexedConnection,
}

impl RedisKv {
    pub async fn connect(redis_url: &str) -> Result<Self, EntitlementError> {
        let client = RedisClient::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, EntitlementError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), EntitlementError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), EntitlementError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}

/// What actually lands in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub decision: EntitlementDecision,
    pub fetched_at: i64,
    pub ttl_millis: u64,
}

impl CacheEntry {
    pub fn is_fresh_at(&self, now_millis: i64) -> bool {
        let age = now_millis.saturating_sub(self.fetched_at);
        age < self.ttl_millis as i64
    }
}

/// Time-boxed slot holding the last verified decision.
#[derive(Clone)]
pub struct EntitlementCache {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    ttl_millis: u64,
}

impl EntitlementCache {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, ttl_millis: u64) -> Self {
        Self {
            store,
            clock,
            ttl_millis,
        }
    }

    /// Raw entry, stale or not. Undecodable blobs read as absent.
    pub async fn entry(&self) -> Option<CacheEntry> {
        let raw = match self.store.get(CACHE_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read entitlement cache");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Discarding undecodable entitlement cache entry");
                None
            }
        }
    }

    /// The cached decision while it is still fresh.
    pub async fn get(&self) -> Option<EntitlementDecision> {
        let entry = self.entry().await?;
        if entry.is_fresh_at(self.clock.now_millis()) {
            Some(entry.decision)
        } else {
            None
        }
    }

    pub async fn set(&self, decision: &EntitlementDecision) -> Result<(), EntitlementError> {
        let entry = CacheEntry {
            decision: decision.clone(),
            fetched_at: self.clock.now_millis(),
            ttl_millis: self.ttl_millis,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| EntitlementError::Cache(e.to_string()))?;
        self.store.set(CACHE_KEY, json).await
    }

    pub async fn invalidate(&self) -> Result<(), EntitlementError> {
        self.store.remove(CACHE_KEY).await
    }
}
