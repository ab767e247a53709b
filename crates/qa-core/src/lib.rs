use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use qa_error::{QaError as Error, Result};

pub const MAX_QUERY_CHARS: usize = 500;
pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 10;
pub const DEFAULT_MAX_CHARS_PER_EVIDENCE: usize = 1200;
pub const MIN_CHARS_PER_EVIDENCE: usize = 200;
pub const MAX_CHARS_PER_EVIDENCE: usize = 4000;

/// 回答模式：strict 更保守
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    #[default]
    Balanced,
    Strict,
}

/// `POST /answer` 请求体（未校验）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub query: String,
    pub top_k: Option<i64>,
    pub include_evidence: Option<bool>,
    pub mode: Option<AnswerMode>,
    pub max_chars_per_evidence: Option<i64>,
}

/// 校验并填充默认值之后的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub query: String,
    pub top_k: usize,
    pub include_evidence: bool,
    pub mode: AnswerMode,
    pub max_chars_per_evidence: usize,
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// 按接口约束校验请求，失败时返回 `Validation`
    pub fn validate(&self) -> Result<()> {
        let len = self.query.chars().count();
        if len == 0 || len > MAX_QUERY_CHARS {
            return Err(Error::Validation {
                message: format!("query must be 1-{} characters", MAX_QUERY_CHARS),
            });
        }
        if let Some(k) = self.top_k {
            if !(1..=MAX_TOP_K as i64).contains(&k) {
                return Err(Error::Validation {
                    message: format!("top_k must be between 1 and {}", MAX_TOP_K),
                });
            }
        }
        if let Some(n) = self.max_chars_per_evidence {
            if !(MIN_CHARS_PER_EVIDENCE as i64..=MAX_CHARS_PER_EVIDENCE as i64).contains(&n) {
                return Err(Error::Validation {
                    message: format!(
                        "max_chars_per_evidence must be between {} and {}",
                        MIN_CHARS_PER_EVIDENCE, MAX_CHARS_PER_EVIDENCE
                    ),
                });
            }
        }
        Ok(())
    }

    /// 应用默认值与区间裁剪，不做校验
    pub fn resolve(&self) -> ResolvedRequest {
        let top_k = self
            .top_k
            .unwrap_or(DEFAULT_TOP_K as i64)
            .clamp(1, MAX_TOP_K as i64) as usize;
        ResolvedRequest {
            query: self.query.trim().to_string(),
            top_k,
            include_evidence: self.include_evidence.unwrap_or(true),
            mode: self.mode.unwrap_or_default(),
            max_chars_per_evidence: clamp_evidence_chars(
                self.max_chars_per_evidence
                    .unwrap_or(DEFAULT_MAX_CHARS_PER_EVIDENCE as i64),
            ),
        }
    }
}

pub fn clamp_evidence_chars(value: i64) -> usize {
    value.clamp(MIN_CHARS_PER_EVIDENCE as i64, MAX_CHARS_PER_EVIDENCE as i64) as usize
}

/// 问答帖子：问题 + 回复
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body_md: String,
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub answers: Vec<Reply>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub body_md: String,
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Thread {
    /// 优先 markdown，空时回退到纯文本
    pub fn body_source(&self) -> &str {
        pick_body(&self.body_md, self.body_text.as_deref())
    }
}

impl Reply {
    pub fn body_source(&self) -> &str {
        pick_body(&self.body_md, self.body_text.as_deref())
    }
}

fn pick_body<'a>(md: &'a str, text: Option<&'a str>) -> &'a str {
    if !md.is_empty() {
        md
    } else {
        text.unwrap_or("")
    }
}

/// 检索命中（按排名顺序）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl RetrievedItem {
    pub fn without_snippet(&self) -> Self {
        Self {
            snippet: String::new(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerCitation {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

/// 策略闸门的结论：是否允许走模型路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelAccess {
    Allowed,
    Denied {
        /// 写入降级答案开头的说明
        message: String,
        warnings: Vec<String>,
    },
}

impl ModelAccess {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ModelAccess::Allowed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub query: String,
    pub answer_markdown: String,
    pub citations: Vec<AnswerCitation>,
    pub retrieved: Vec<RetrievedItem>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let req = AnswerRequest::new("  how do I connect?  ");
        req.validate().unwrap();
        let resolved = req.resolve();
        assert_eq!(resolved.query, "how do I connect?");
        assert_eq!(resolved.top_k, 5);
        assert!(resolved.include_evidence);
        assert_eq!(resolved.mode, AnswerMode::Balanced);
        assert_eq!(resolved.max_chars_per_evidence, 1200);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(AnswerRequest::new("").validate().is_err());
        assert!(AnswerRequest::new("x".repeat(501)).validate().is_err());
        assert!(AnswerRequest::new("x".repeat(500)).validate().is_ok());

        let mut req = AnswerRequest::new("demo");
        req.top_k = Some(0);
        assert!(req.validate().is_err());
        req.top_k = Some(11);
        assert!(req.validate().is_err());
        req.top_k = Some(10);
        assert!(req.validate().is_ok());

        req.max_chars_per_evidence = Some(199);
        assert!(matches!(req.validate(), Err(Error::Validation { .. })));
        req.max_chars_per_evidence = Some(4000);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_clamp_evidence_chars() {
        assert_eq!(clamp_evidence_chars(10), 200);
        assert_eq!(clamp_evidence_chars(999_999), 4000);
        assert_eq!(clamp_evidence_chars(1500), 1500);
    }

    #[test]
    fn test_request_deserialize() {
        let req: AnswerRequest = serde_json::from_str(
            r#"{"query":"demo","mode":"strict","include_evidence":false,"top_k":3}"#,
        )
        .unwrap();
        let resolved = req.resolve();
        assert_eq!(resolved.mode, AnswerMode::Strict);
        assert!(!resolved.include_evidence);
        assert_eq!(resolved.top_k, 3);

        let bad = serde_json::from_str::<AnswerRequest>(r#"{"query":"demo","mode":"wild"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_thread_camel_case_and_body_fallback() {
        let thread: Thread = serde_json::from_str(
            r#"{"id":"t1","title":"T","bodyMd":"","bodyText":"plain","answers":[{"id":"a1","bodyMd":"**x**"}]}"#,
        )
        .unwrap();
        assert_eq!(thread.body_source(), "plain");
        assert_eq!(thread.answers[0].body_source(), "**x**");
    }

    #[test]
    fn test_citation_quote_omitted_when_absent() {
        let citation = AnswerCitation {
            id: "t1".into(),
            title: "T".into(),
            url: "https://a2a.example/q/t1".into(),
            quote: None,
        };
        let json = serde_json::to_value(&citation).unwrap();
        assert!(json.get("quote").is_none());
    }
}
