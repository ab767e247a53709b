use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use qa_core::ModelAccess;
use qa_error::{ErrorMetadataBuilder, QaError};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::api_key::{validate_bearer, ApiKeyStore};
use crate::caller::CallerIdentity;
use crate::quota::{utc_date_key, QuotaStore};

/// 模型路径策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_require_api_key")]
    pub require_api_key: bool,
    /// 小写 agent 名称；为空表示不限制
    #[serde(default)]
    pub agent_allowlist: HashSet<String>,
    /// 每个身份每个 UTC 日的模型调用次数；<= 0 关闭配额
    #[serde(default = "default_daily_limit")]
    pub daily_limit: i64,
}

fn default_require_api_key() -> bool {
    true
}

fn default_daily_limit() -> i64 {
    50
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            require_api_key: default_require_api_key(),
            agent_allowlist: HashSet::new(),
            daily_limit: default_daily_limit(),
        }
    }
}

impl PolicyConfig {
    /// 逗号分隔，去空白、转小写、丢弃空项
    pub fn parse_allowlist(raw: &str) -> HashSet<String> {
        raw.split(',')
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// 配置文件里可能写了大小写混合的名字
    pub fn normalized(mut self) -> Self {
        self.agent_allowlist = self
            .agent_allowlist
            .iter()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect();
        self
    }
}

/// 拒绝原因，按判定顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Disabled,
    AgentNotAllowed,
    ApiKeyRequired,
    DailyLimit,
}

impl DenyReason {
    pub fn warning(self) -> &'static str {
        match self {
            DenyReason::Disabled => "LLM disabled by policy.",
            DenyReason::AgentNotAllowed => "LLM disabled for this agent.",
            DenyReason::ApiKeyRequired => "LLM requires a valid API key.",
            DenyReason::DailyLimit => "LLM daily limit reached.",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            DenyReason::Disabled => "LLM disabled; returning retrieved evidence only.",
            DenyReason::AgentNotAllowed => {
                "LLM disabled for this agent; returning retrieved evidence only."
            }
            DenyReason::ApiKeyRequired => {
                "LLM requires a valid API key; returning retrieved evidence only."
            }
            DenyReason::DailyLimit => "LLM daily limit reached; returning retrieved evidence only.",
        }
    }

    pub fn into_access(self) -> ModelAccess {
        ModelAccess::Denied {
            message: self.message().to_string(),
            warnings: vec![self.warning().to_string()],
        }
    }
}

/// 决定一次请求能否走模型路径。遇到第一个不满足的条件即返回，从不报错
pub struct PolicyGate {
    config: PolicyConfig,
    model_configured: bool,
    keys: Arc<dyn ApiKeyStore>,
    quota: Arc<dyn QuotaStore>,
}

impl PolicyGate {
    pub fn new(
        config: PolicyConfig,
        model_configured: bool,
        keys: Arc<dyn ApiKeyStore>,
        quota: Arc<dyn QuotaStore>,
    ) -> Self {
        Self {
            config: config.normalized(),
            model_configured,
            keys,
            quota,
        }
    }

    pub async fn evaluate(&self, caller: &CallerIdentity) -> ModelAccess {
        self.evaluate_at(caller, Utc::now()).await
    }

    #[instrument(skip(self, caller, now), fields(identity = %caller.quota_key()))]
    pub async fn evaluate_at(&self, caller: &CallerIdentity, now: DateTime<Utc>) -> ModelAccess {
        match self.check(caller, now).await {
            None => ModelAccess::Allowed,
            Some(reason) => {
                info!(reason = reason.warning(), "model path denied");
                reason.into_access()
            }
        }
    }

    async fn check(&self, caller: &CallerIdentity, now: DateTime<Utc>) -> Option<DenyReason> {
        if !self.config.enabled || !self.model_configured {
            return Some(DenyReason::Disabled);
        }

        if !self.config.agent_allowlist.is_empty() {
            let allowed = caller
                .normalized_agent()
                .map_or(false, |name| self.config.agent_allowlist.contains(&name));
            if !allowed {
                return Some(DenyReason::AgentNotAllowed);
            }
        }

        if self.config.require_api_key {
            match validate_bearer(self.keys.as_ref(), caller.authorization.as_deref(), now).await {
                Ok(check) if check.is_valid() => {}
                Ok(_) => return Some(DenyReason::ApiKeyRequired),
                Err(e) => {
                    log_store_error(&e, "validate_api_key", caller);
                    return Some(DenyReason::ApiKeyRequired);
                }
            }
        }

        if self.config.daily_limit > 0 {
            let identity = caller.quota_key();
            let limit = self.config.daily_limit as u64;
            match self
                .quota
                .try_consume(&identity, &utc_date_key(now), limit)
                .await
            {
                Ok(true) => {}
                Ok(false) => return Some(DenyReason::DailyLimit),
                Err(e) => {
                    log_store_error(&e, "consume_quota", caller);
                    return Some(DenyReason::DailyLimit);
                }
            }
        }

        None
    }
}

fn log_store_error(e: &QaError, operation: &str, caller: &CallerIdentity) {
    let metadata = ErrorMetadataBuilder::new("policy_gate")
        .operation(operation)
        .identity(&caller.quota_key())
        .build(e);
    e.log(&metadata);
}
