use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qa_error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

/// 日志和配额键里只允许出现的密钥前缀长度
pub const KEY_PREFIX_LEN: usize = 8;

/// 已登记的 API 密钥；不保存明文
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub key_prefix: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    pub fn from_plaintext(key: &str, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            key_prefix: key_prefix(key),
            key_hash: hash_key(key),
            expires_at,
            revoked_at: None,
        }
    }

    pub fn revoked(mut self, at: DateTime<Utc>) -> Self {
        self.revoked_at = Some(at);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |t| t < now)
    }
}

pub fn key_prefix(key: &str) -> String {
    key.chars().take(KEY_PREFIX_LEN).collect()
}

/// SHA-256 十六进制摘要
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// 密钥校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCheck {
    Valid { key_prefix: String },
    Missing,
    Invalid,
    Expired,
}

impl KeyCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, KeyCheck::Valid { .. })
    }
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// 按前缀与摘要查找未吊销的密钥
    async fn find_active(&self, key_prefix: &str, key_hash: &str) -> Result<Option<ApiKeyRecord>>;
}

#[derive(Default, Clone)]
pub struct MemoryApiKeyStore {
    keys: Arc<RwLock<Vec<ApiKeyRecord>>>,
}

impl MemoryApiKeyStore {
    pub fn new(keys: Vec<ApiKeyRecord>) -> Self {
        Self {
            keys: Arc::new(RwLock::new(keys)),
        }
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }
}

#[async_trait]
impl ApiKeyStore for MemoryApiKeyStore {
    async fn find_active(&self, key_prefix: &str, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        let keys = self.keys.read().await;
        Ok(keys
            .iter()
            .find(|k| k.key_prefix == key_prefix && k.key_hash == key_hash && k.revoked_at.is_none())
            .cloned())
    }
}

/// 解析 `Authorization` 头。方案不是 bearer 时返回 `None`；令牌可能为空串
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(rest.trim())
}

pub async fn validate_bearer(
    store: &dyn ApiKeyStore,
    authorization: Option<&str>,
    now: DateTime<Utc>,
) -> Result<KeyCheck> {
    let Some(token) = authorization.and_then(parse_bearer) else {
        return Ok(KeyCheck::Missing);
    };
    if token.is_empty() {
        return Ok(KeyCheck::Invalid);
    }

    let prefix = key_prefix(token);
    let Some(record) = store.find_active(&prefix, &hash_key(token)).await? else {
        debug!(key_prefix = %prefix, "api key not found");
        return Ok(KeyCheck::Invalid);
    };
    if record.is_expired_at(now) {
        debug!(key_prefix = %prefix, "api key expired");
        return Ok(KeyCheck::Expired);
    }
    Ok(KeyCheck::Valid { key_prefix: prefix })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const KEY: &str = "a2a_live_0123456789abcdef";

    #[test]
    fn test_hash_and_prefix() {
        assert_eq!(
            hash_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(key_prefix(KEY), "a2a_live");
        assert_eq!(key_prefix("short"), "short");
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("bearer   abc  "), Some("abc"));
        assert_eq!(parse_bearer("Bearer "), Some(""));
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Basic abc"), None);
    }

    #[tokio::test]
    async fn test_validate_bearer_outcomes() {
        let now = Utc::now();
        let store = MemoryApiKeyStore::new(vec![ApiKeyRecord::from_plaintext(KEY, None)]);

        let header = format!("Bearer {}", KEY);
        assert_eq!(
            validate_bearer(&store, Some(&header), now).await.unwrap(),
            KeyCheck::Valid {
                key_prefix: "a2a_live".into()
            }
        );
        assert_eq!(validate_bearer(&store, None, now).await.unwrap(), KeyCheck::Missing);
        assert_eq!(
            validate_bearer(&store, Some("Token abc"), now).await.unwrap(),
            KeyCheck::Missing
        );
        assert_eq!(
            validate_bearer(&store, Some("Bearer  "), now).await.unwrap(),
            KeyCheck::Invalid
        );
        assert_eq!(
            validate_bearer(&store, Some("Bearer a2a_live_wrong"), now).await.unwrap(),
            KeyCheck::Invalid
        );
    }

    #[tokio::test]
    async fn test_expired_and_revoked_keys() {
        let now = Utc::now();
        let store = MemoryApiKeyStore::new(vec![
            ApiKeyRecord::from_plaintext("expired_key_1", Some(now - Duration::hours(1))),
            ApiKeyRecord::from_plaintext("revoked_key_1", None).revoked(now),
            ApiKeyRecord::from_plaintext("future_key_1", Some(now + Duration::days(1))),
        ]);

        assert_eq!(
            validate_bearer(&store, Some("Bearer expired_key_1"), now).await.unwrap(),
            KeyCheck::Expired
        );
        assert_eq!(
            validate_bearer(&store, Some("Bearer revoked_key_1"), now).await.unwrap(),
            KeyCheck::Invalid
        );
        assert!(validate_bearer(&store, Some("Bearer future_key_1"), now)
            .await
            .unwrap()
            .is_valid());
        assert_eq!(store.len().await, 3);
    }

    #[test]
    fn test_hash_not_serialized() {
        let json = serde_json::to_string(&ApiKeyRecord::from_plaintext(KEY, None)).unwrap();
        assert!(!json.contains(&hash_key(KEY)));
        assert!(json.contains("a2a_live"));
    }
}
