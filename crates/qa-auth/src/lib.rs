pub mod api_key;
pub mod caller;
pub mod policy;
pub mod quota;

// 重新导出核心类型
pub use api_key::{
    hash_key, key_prefix, parse_bearer, validate_bearer, ApiKeyRecord, ApiKeyStore, KeyCheck,
    MemoryApiKeyStore, KEY_PREFIX_LEN,
};
pub use caller::{CallerIdentity, MAX_AGENT_NAME_CHARS};
pub use policy::{DenyReason, PolicyConfig, PolicyGate};
pub use quota::{utc_date_key, MemoryQuotaStore, QuotaEntry, QuotaStore, RedisQuotaStore};

// 错误类型
pub use qa_error::{QaError, Result};
