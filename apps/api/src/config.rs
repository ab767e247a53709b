use std::collections::HashSet;

use chrono::{DateTime, Utc};
use qa_auth::{ApiKeyRecord, PolicyConfig};
use qa_llm::ChatProviderConfig;
use serde::Deserialize;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "configs/default.yaml";

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub server: ServerCfg,
    #[serde(default)]
    pub chat_provider: Option<ChatCfgYaml>,
    #[serde(default)]
    pub llm: LlmCfg,
    #[serde(default)]
    pub quota: QuotaCfg,
    #[serde(default)]
    pub threads: ThreadsCfg,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyCfg>,
}

#[derive(Debug, Deserialize)]
pub struct ServerCfg {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub public_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCfgYaml {
    pub kind: String,
    pub base_url: Option<String>,
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LlmCfg {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub require_api_key: bool,
    #[serde(default)]
    pub agent_allowlist: Vec<String>,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: i64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LlmCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            require_api_key: true,
            agent_allowlist: Vec::new(),
            daily_limit: default_daily_limit(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl LlmCfg {
    pub fn policy(&self) -> PolicyConfig {
        PolicyConfig {
            enabled: self.enabled,
            require_api_key: self.require_api_key,
            agent_allowlist: self.agent_allowlist.iter().cloned().collect::<HashSet<_>>(),
            daily_limit: self.daily_limit,
        }
        .normalized()
    }
}

#[derive(Debug, Deserialize)]
pub struct QuotaCfg {
    #[serde(default = "default_quota_kind")]
    pub kind: String,
    pub redis_url_env: Option<String>,
}

impl Default for QuotaCfg {
    fn default() -> Self {
        Self {
            kind: default_quota_kind(),
            redis_url_env: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ThreadsCfg {
    pub seed_path: Option<String>,
}

/// 明文密钥只从环境变量读取
#[derive(Debug, Deserialize)]
pub struct ApiKeyCfg {
    pub key_env: String,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked: bool,
}

fn default_true() -> bool {
    true
}

fn default_daily_limit() -> i64 {
    50
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_quota_kind() -> String {
    "memory".into()
}

fn env_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

impl AppConfig {
    /// 读取 `QA_CONFIG`（默认 `configs/default.yaml`），再叠加环境变量
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("QA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path, e))?;
        let mut cfg = Self::from_yaml_str(&s)?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        info!(
            path = %path,
            llm_enabled = cfg.llm.enabled,
            require_api_key = cfg.llm.require_api_key,
            daily_limit = cfg.llm.daily_limit,
            quota = %cfg.quota.kind,
            "load_config"
        );
        Ok(cfg)
    }

    pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LLM_ENABLED") {
            self.llm.enabled = env_flag(&v);
        }
        if let Some(v) = lookup("LLM_REQUIRE_API_KEY") {
            self.llm.require_api_key = env_flag(&v);
        }
        if let Some(v) = lookup("LLM_AGENT_ALLOWLIST") {
            self.llm.agent_allowlist = PolicyConfig::parse_allowlist(&v).into_iter().collect();
        }
        if let Some(v) = lookup("LLM_DAILY_LIMIT") {
            match v.trim().parse() {
                Ok(limit) => self.llm.daily_limit = limit,
                Err(_) => warn!(value = %v, "ignoring invalid LLM_DAILY_LIMIT"),
            }
        }
        if let Some(v) = lookup("PUBLIC_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.server.public_base_url = Some(v.trim().to_string());
        }
        if let Some(v) = lookup("PORT") {
            match v.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %v, "ignoring invalid PORT"),
            }
        }
    }

    /// YAML 中的 `chat_provider` 优先；否则回退到 `LLM_*` 环境变量，都没有则不启用模型
    pub fn chat_provider_config<F>(&self, lookup: F) -> anyhow::Result<Option<ChatProviderConfig>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(chat) = self.chat_provider.as_ref() else {
            return Ok(ChatProviderConfig::from_lookup(lookup));
        };
        let read_key = |default_env: &str| -> anyhow::Result<String> {
            let env = chat.api_key_env.as_deref().unwrap_or(default_env);
            lookup(env).ok_or_else(|| anyhow::anyhow!("missing env {}", env))
        };
        let cfg = match chat.kind.as_str() {
            "openai_compat" => ChatProviderConfig::OpenAiCompat {
                base_url: chat.base_url.clone(),
                api_key: read_key("OPENAI_API_KEY")?,
                model: chat.model.clone(),
                temperature: chat.temperature,
                max_tokens: chat.max_tokens,
            },
            "anthropic" => ChatProviderConfig::Anthropic {
                api_url: chat.api_url.clone(),
                api_key: read_key("ANTHROPIC_API_KEY")?,
                model: chat.model.clone(),
                temperature: chat.temperature,
                max_tokens: chat.max_tokens,
            },
            other => anyhow::bail!("unsupported chat provider kind={}", other),
        };
        Ok(Some(cfg))
    }

    /// 缺少对应环境变量的密钥会被跳过
    pub fn api_key_records<F>(&self, lookup: F) -> Vec<ApiKeyRecord>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_keys
            .iter()
            .filter_map(|k| {
                let Some(key) = lookup(&k.key_env).filter(|v| !v.is_empty()) else {
                    warn!(key_env = %k.key_env, "api key env not set; skipping");
                    return None;
                };
                let record = ApiKeyRecord::from_plaintext(&key, k.expires_at);
                Some(if k.revoked {
                    record.revoked(Utc::now())
                } else {
                    record
                })
            })
            .collect()
    }
}
