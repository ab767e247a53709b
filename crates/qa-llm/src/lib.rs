use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

pub use qa_error::{QaError, Result};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 700;

/// 补全接口：一条 system 指令 + 一条 user 消息，返回模型原始文本
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, system: &str, user: &str) -> Result<String>;

    fn provider(&self) -> &'static str {
        "unknown"
    }
}

// ========== OpenAI-compatible (covers OpenAI, DeepSeek, some Qwen proxies) ==========

#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    pub base_url: String, // e.g. https://api.openai.com/v1
    pub api_key: String,  // Bearer token
    pub model: String,    // e.g. gpt-4o-mini, deepseek-chat
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    cfg: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(cfg: OpenAiCompatConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, system: &str, user: &str) -> OaiChatReq {
        OaiChatReq {
            model: self.cfg.model.clone(),
            messages: vec![
                OaiChatReqMsg {
                    role: "system".into(),
                    content: system.to_string(),
                },
                OaiChatReqMsg {
                    role: "user".into(),
                    content: user.to_string(),
                },
            ],
            temperature: Some(self.cfg.temperature),
            max_tokens: Some(self.cfg.max_tokens),
        }
    }
}

#[derive(Serialize)]
struct OaiChatReqMsg {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OaiChatReq {
    model: String,
    messages: Vec<OaiChatReqMsg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OaiChatRespChoiceMsg {
    #[serde(default)]
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct OaiChatRespChoice {
    message: OaiChatRespChoiceMsg,
}

#[derive(Deserialize)]
struct OaiChatResp {
    #[serde(default)]
    choices: Vec<OaiChatRespChoice>,
}

impl OaiChatResp {
    // 非字符串内容按空文本处理
    fn into_text(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content.as_str().map(str::to_string))
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    #[instrument(skip(self, system, user), fields(model = %self.cfg.model))]
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let body = self.request_body(system, user);

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(QaError::LlmService {
                provider: self.provider().to_string(),
                message: format!("status={} body={}", status, txt),
            });
        }

        let data: OaiChatResp = resp.json().await?;
        Ok(data.into_text())
    }

    fn provider(&self) -> &'static str {
        "openai_compat"
    }
}

// ========== Anthropic (Claude) ==========

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,   // e.g. claude-3-5-sonnet-latest
    pub api_url: String, // default https://api.anthropic.com
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone)]
pub struct AnthropicClient {
    http: Client,
    cfg: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(cfg: AnthropicConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }
}

#[derive(Serialize)]
struct AnthMessageContent {
    r#type: &'static str,
    text: String,
}

#[derive(Serialize)]
struct AnthMessageReqMsg {
    role: &'static str,
    content: Vec<AnthMessageContent>,
}

#[derive(Serialize)]
struct AnthMessageReq {
    model: String,
    system: String,
    messages: Vec<AnthMessageReqMsg>,
    max_tokens: u32,
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct AnthMessageRespContent {
    #[allow(dead_code)]
    r#type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthMessageResp {
    content: Vec<AnthMessageRespContent>,
}

#[async_trait]
impl ChatModel for AnthropicClient {
    #[instrument(skip(self, system, user), fields(model = %self.cfg.model))]
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.cfg.api_url.trim_end_matches('/'));
        let body = AnthMessageReq {
            model: self.cfg.model.clone(),
            system: system.to_string(),
            messages: vec![AnthMessageReqMsg {
                role: "user",
                content: vec![AnthMessageContent {
                    r#type: "text",
                    text: user.to_string(),
                }],
            }],
            max_tokens: self.cfg.max_tokens,
            temperature: Some(self.cfg.temperature),
        };

        let resp = self
            .http
            .post(url)
            .header("x-api-key", &self.cfg.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(QaError::LlmService {
                provider: self.provider().to_string(),
                message: format!("status={} body={}", status, txt),
            });
        }

        let data: AnthMessageResp = resp.json().await?;
        let mut out = String::new();
        for c in data.content.into_iter() {
            if let Some(t) = c.text {
                out.push_str(&t);
            }
        }
        Ok(out)
    }

    fn provider(&self) -> &'static str {
        "anthropic"
    }
}

// ========== Provider Factory & Config ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ChatProviderConfig {
    #[serde(rename = "openai_compat")]
    OpenAiCompat {
        base_url: Option<String>,
        api_key: String,
        model: String,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    },
    #[serde(rename = "anthropic")]
    Anthropic {
        api_url: Option<String>,
        api_key: String,
        model: String,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    },
}

impl ChatProviderConfig {
    /// 从 `LLM_*` 变量构造；缺少 key 或 model 时视为未配置
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("LLM_API_KEY").unwrap_or_default();
        let model = lookup("LLM_MODEL").unwrap_or_default();
        if api_key.is_empty() || model.is_empty() {
            return None;
        }
        let base_url = lookup("LLM_BASE_URL").filter(|s| !s.is_empty());
        let temperature = lookup("LLM_TEMPERATURE").and_then(|s| s.parse().ok());
        let max_tokens = lookup("LLM_MAX_TOKENS").and_then(|s| s.parse().ok());
        Some(ChatProviderConfig::OpenAiCompat {
            base_url,
            api_key,
            model,
            temperature,
            max_tokens,
        })
    }
}

pub fn make_chat_model(cfg: ChatProviderConfig) -> Result<Box<dyn ChatModel>> {
    let model: Box<dyn ChatModel> = match cfg {
        ChatProviderConfig::OpenAiCompat {
            base_url,
            api_key,
            model,
            temperature,
            max_tokens,
        } => {
            ensure_present("api_key", &api_key)?;
            ensure_present("model", &model)?;
            Box::new(OpenAiCompatClient::new(OpenAiCompatConfig {
                base_url: base_url
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into())
                    .trim_end_matches('/')
                    .to_string(),
                api_key,
                model,
                temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
                max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            }))
        }
        ChatProviderConfig::Anthropic {
            api_url,
            api_key,
            model,
            temperature,
            max_tokens,
        } => {
            ensure_present("api_key", &api_key)?;
            ensure_present("model", &model)?;
            Box::new(AnthropicClient::new(AnthropicConfig {
                api_url: api_url.unwrap_or_else(|| DEFAULT_ANTHROPIC_API_URL.into()),
                api_key,
                model,
                temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
                max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            }))
        }
    };
    Ok(model)
}

fn ensure_present(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(QaError::Configuration {
            key: key.to_string(),
            reason: "not configured".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_requires_key_and_model() {
        assert!(ChatProviderConfig::from_lookup(lookup_from(&[("LLM_API_KEY", "sk-1")])).is_none());
        assert!(ChatProviderConfig::from_lookup(lookup_from(&[("LLM_MODEL", "gpt")])).is_none());

        let cfg = ChatProviderConfig::from_lookup(lookup_from(&[
            ("LLM_API_KEY", "sk-1"),
            ("LLM_MODEL", "gpt-4o-mini"),
            ("LLM_TEMPERATURE", "0.5"),
            ("LLM_MAX_TOKENS", "not-a-number"),
        ]))
        .unwrap();
        match cfg {
            ChatProviderConfig::OpenAiCompat {
                base_url,
                temperature,
                max_tokens,
                model,
                ..
            } => {
                assert_eq!(base_url, None);
                assert_eq!(temperature, Some(0.5));
                assert_eq!(max_tokens, None);
                assert_eq!(model, "gpt-4o-mini");
            }
            other => panic!("unexpected provider {:?}", other),
        }
    }

    #[test]
    fn test_openai_request_shape() {
        let client = OpenAiCompatClient::new(OpenAiCompatConfig {
            base_url: "https://llm.example/v1/".into(),
            api_key: "sk".into(),
            model: "m".into(),
            temperature: 0.2,
            max_tokens: 700,
        });
        assert_eq!(client.endpoint(), "https://llm.example/v1/chat/completions");
        let body = serde_json::to_value(client.request_body("sys", "usr")).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
        assert_eq!(body["max_tokens"], 700);
    }

    #[test]
    fn test_openai_response_text() {
        let resp: OaiChatResp =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"hello"}}]}"#).unwrap();
        assert_eq!(resp.into_text(), "hello");

        let resp: OaiChatResp =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert_eq!(resp.into_text(), "");

        let resp: OaiChatResp = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(resp.into_text(), "");
    }

    #[test]
    fn test_make_chat_model() {
        let model = make_chat_model(ChatProviderConfig::Anthropic {
            api_url: None,
            api_key: "key".into(),
            model: "claude".into(),
            temperature: None,
            max_tokens: None,
        })
        .unwrap();
        assert_eq!(model.provider(), "anthropic");

        let err = make_chat_model(ChatProviderConfig::OpenAiCompat {
            base_url: None,
            api_key: " ".into(),
            model: "m".into(),
            temperature: None,
            max_tokens: None,
        });
        assert!(matches!(err, Err(QaError::Configuration { .. })));
    }
}
