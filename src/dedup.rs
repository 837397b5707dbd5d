//! Idempotency store: records that a (channel, item) pair has been handled.
//!
//! The pipeline depends only on [`DedupStore`]. `SqliteDedupStore` is the
//! restart-safe implementation; `MemoryDedupStore` exists for tests and
//! single-shot tooling where durability is not required.

use crate::db::{self, Pool};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;

#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn has_processed(&self, channel_id: &str, item_id: &str) -> Result<bool>;
    async fn mark_processed(&self, channel_id: &str, item_id: &str) -> Result<()>;
}

fn key(channel_id: &str, item_id: &str) -> String {
    format!("{}\u{1f}{}", channel_id, item_id)
}

/// Volatile store. Does not survive restart; any deployment that can be
/// restarted between publish and archive must use [`SqliteDedupStore`].
#[derive(Default)]
pub struct MemoryDedupStore {
    seen: Mutex<HashSet<String>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn has_processed(&self, channel_id: &str, item_id: &str) -> Result<bool> {
        Ok(self.seen.lock().await.contains(&key(channel_id, item_id)))
    }

    async fn mark_processed(&self, channel_id: &str, item_id: &str) -> Result<()> {
        self.seen.lock().await.insert(key(channel_id, item_id));
        Ok(())
    }
}

/// Durable store backed by the `processed_items` table, with an in-memory
/// cache as a fast path. The cache only ever holds keys that are already
/// durable: writes go to sqlite first, and a cache miss falls through to a
/// durable read, so a fresh process sees everything earlier runs recorded.
pub struct SqliteDedupStore {
    pool: Pool,
    cache: Mutex<HashSet<String>>,
}

impl SqliteDedupStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            cache: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    async fn has_processed(&self, channel_id: &str, item_id: &str) -> Result<bool> {
        let k = key(channel_id, item_id);
        if self.cache.lock().await.contains(&k) {
            return Ok(true);
        }
        let hit = db::has_processed(&self.pool, channel_id, item_id).await?;
        if hit {
            self.cache.lock().await.insert(k);
        }
        Ok(hit)
    }

    async fn mark_processed(&self, channel_id: &str, item_id: &str) -> Result<()> {
        db::mark_processed(&self.pool, channel_id, item_id).await?;
        self.cache.lock().await.insert(key(channel_id, item_id));
        Ok(())
    }
}
