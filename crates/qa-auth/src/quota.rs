use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qa_error::{QaError, Result};
use redis::{AsyncCommands, Client as RedisClient};
use tokio::sync::Mutex;
use tracing::debug;

/// Redis 计数键的存活时间，覆盖跨日边界
const REDIS_QUOTA_TTL_SECS: usize = 2 * 24 * 60 * 60;

/// UTC 日期键 `YYYY-MM-DD`
pub fn utc_date_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaEntry {
    pub date_key: String,
    pub count: u64,
}

/// 每日配额计数。检查与递增必须是一个原子操作
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// 未超限时计数加一并返回 `true`；已达上限返回 `false` 且不计数
    async fn try_consume(&self, identity: &str, date_key: &str, limit: u64) -> Result<bool>;
}

#[derive(Default, Clone)]
pub struct MemoryQuotaStore {
    entries: Arc<Mutex<HashMap<String, QuotaEntry>>>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn usage(&self, identity: &str) -> Option<QuotaEntry> {
        self.entries.lock().await.get(identity).cloned()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn try_consume(&self, identity: &str, date_key: &str, limit: u64) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(identity) {
            Some(entry) if entry.date_key == date_key => {
                if entry.count >= limit {
                    return Ok(false);
                }
                entry.count += 1;
                Ok(true)
            }
            _ => {
                entries.insert(
                    identity.to_string(),
                    QuotaEntry {
                        date_key: date_key.to_string(),
                        count: 1,
                    },
                );
                Ok(true)
            }
        }
    }
}

/// 多实例部署共享的配额计数
pub struct RedisQuotaStore {
    client: RedisClient,
    key_prefix: String,
}

impl RedisQuotaStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = RedisClient::open(redis_url).map_err(|e| QaError::Configuration {
            key: "redis_url".to_string(),
            reason: format!("Failed to connect to Redis: {}", e),
        })?;
        Ok(Self {
            client,
            key_prefix: "llm_quota".to_string(),
        })
    }

    fn counter_key(&self, identity: &str, date_key: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, identity, date_key)
    }

    /// MULTI/INCR/EXPIRE/EXEC：计数与过期时间一起提交，不会留下没有 TTL 的计数键
    fn consume_pipeline(key: &str) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .incr(key, 1)
            .expire(key, REDIS_QUOTA_TTL_SECS)
            .ignore();
        pipe
    }
}

fn redis_error(operation: &str, e: redis::RedisError) -> QaError {
    QaError::Network {
        operation: operation.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn try_consume(&self, identity: &str, date_key: &str, limit: u64) -> Result<bool> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| redis_error("redis_connection", e))?;

        let key = self.counter_key(identity, date_key);
        let (count,): (u64,) = Self::consume_pipeline(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("redis_incr", e))?;
        if count > limit {
            // 超限的这次不计入
            conn.decr::<_, _, ()>(&key, 1)
                .await
                .map_err(|e| redis_error("redis_decr", e))?;
            debug!(identity, count, limit, "redis quota exhausted");
            return Ok(false);
        }
        Ok(true)
    }
}
