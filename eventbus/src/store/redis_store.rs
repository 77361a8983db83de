//! Redis 死信存储（RedisDeadLetterStore）
//!
//! 条目以 JSON 形式保存在列表 `{prefix}dlq` 中，`LPUSH` 追加，
//! 因此 `LRANGE 0 n` 天然为从新到旧。

use async_trait::async_trait;
use eventbus_core::dead_letter::{DeadLetterEntry, DeadLetterStore};
use eventbus_core::error::{EventError, EventResult};
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::{info, warn};

use crate::error::BusResult;

pub struct RedisDeadLetterStore {
    conn: ConnectionManager,
    key: String,
}

fn store_err(err: redis::RedisError) -> EventError {
    EventError::dead_letter_store(err.to_string())
}

impl RedisDeadLetterStore {
    /// 创建 Redis 死信存储
    ///
    /// # Arguments
    /// * `url` - Redis 连接地址
    /// * `key_prefix` - 键前缀（与通道前缀一致，如 `eventbus:`）
    pub async fn new(url: &str, key_prefix: &str) -> BusResult<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let key = format!("{key_prefix}dlq");

        info!(key = %key, "Connected to Redis for dead letters");

        Ok(Self { conn, key })
    }

    fn decode(raw: &str) -> Option<DeadLetterEntry> {
        match serde_json::from_str(raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable dead letter");
                None
            }
        }
    }
}

#[async_trait]
impl DeadLetterStore for RedisDeadLetterStore {
    async fn append(&self, entry: DeadLetterEntry) -> EventResult<()> {
        let raw = serde_json::to_string(&entry)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(&self.key, raw).await.map_err(store_err)?;
        Ok(())
    }

    async fn list(&self, limit: usize) -> EventResult<Vec<DeadLetterEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let stop = isize::try_from(limit).unwrap_or(isize::MAX) - 1;
        let raw: Vec<String> = conn.lrange(&self.key, 0, stop).await.map_err(store_err)?;
        Ok(raw.iter().filter_map(|r| Self::decode(r)).collect())
    }

    async fn remove(&self, event_id: &str) -> EventResult<Vec<DeadLetterEntry>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(&self.key, 0, -1).await.map_err(store_err)?;

        let mut removed = Vec::new();
        for r in raw {
            let Some(entry) = Self::decode(&r) else {
                continue;
            };
            if entry.event_id() != event_id {
                continue;
            }
            let count: i64 = conn.lrem(&self.key, 1, &r).await.map_err(store_err)?;
            // 并发移除时可能已被他人取走
            if count > 0 {
                removed.push(entry);
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> EventResult<usize> {
        let mut conn = self.conn.clone();
        let (count, _): (usize, i64) = redis::pipe()
            .atomic()
            .llen(&self.key)
            .del(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(count)
    }

    async fn len(&self) -> EventResult<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(&self.key).await.map_err(store_err)?;
        Ok(len)
    }
}
