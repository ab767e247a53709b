//! 从模型原始输出中提取并校验 JSON。
//!
//! 提取是启发式的：优先取 ```json 围栏内的内容，否则取第一个 `{` 到最后一个 `}`。
//! 模型输出多个对象时会被拼成非法 JSON，按解析失败处理。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Number;
use thiserror::Error;

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```json\s*(.*?)```").expect("static fence pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelQuote {
    pub index: u64,
    pub quote: String,
}

/// 通过 schema 校验后的模型输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedModelOutput {
    pub answer_markdown: String,
    pub used_indices: Vec<u64>,
    pub quotes: Vec<ModelQuote>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("no JSON object found in model output")]
    NoJson,
    #[error("model output is not valid JSON: {0}")]
    Syntax(String),
    #[error("model output does not match the answer schema: {0}")]
    Schema(String),
}

#[derive(Deserialize)]
struct RawModelOutput {
    answer_markdown: String,
    #[serde(default)]
    used_indices: Vec<Number>,
    #[serde(default)]
    quotes: Vec<RawQuote>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Deserialize)]
struct RawQuote {
    index: Number,
    quote: String,
}

/// 返回候选 JSON 文本切片；找不到成对花括号时返回 `None`
pub fn extract_json_candidate(text: &str) -> Option<&str> {
    let candidate = JSON_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&candidate[start..=end])
}

pub fn parse_model_output(text: &str) -> Result<ParsedModelOutput, ParseFailure> {
    let json_text = extract_json_candidate(text).ok_or(ParseFailure::NoJson)?;
    let value: serde_json::Value =
        serde_json::from_str(json_text).map_err(|e| ParseFailure::Syntax(e.to_string()))?;
    let raw: RawModelOutput =
        serde_json::from_value(value).map_err(|e| ParseFailure::Schema(e.to_string()))?;

    let used_indices = raw
        .used_indices
        .iter()
        .map(|n| positive_int(n).ok_or_else(|| bad_index("used_indices", n)))
        .collect::<Result<Vec<_>, _>>()?;
    let quotes = raw
        .quotes
        .into_iter()
        .map(|q| {
            positive_int(&q.index)
                .map(|index| ModelQuote {
                    index,
                    quote: q.quote,
                })
                .ok_or_else(|| bad_index("quotes.index", &q.index))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedModelOutput {
        answer_markdown: raw.answer_markdown,
        used_indices,
        quotes,
        warnings: raw.warnings,
    })
}

/// 整数且 >= 1；`2.0` 这类整值浮点也接受
fn positive_int(n: &Number) -> Option<u64> {
    if let Some(u) = n.as_u64() {
        return (u >= 1).then_some(u);
    }
    let f = n.as_f64()?;
    if f >= 1.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

fn bad_index(field: &str, n: &Number) -> ParseFailure {
    ParseFailure::Schema(format!("{} must be integers >= 1, got {}", field, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FENCED: &str = r#"```json {"answer_markdown":"ok","used_indices":[1],"quotes":[{"index":1,"quote":"hi"}],"warnings":[]} ```"#;

    #[test]
    fn test_fenced_json() {
        let parsed = parse_model_output(FENCED).unwrap();
        assert_eq!(parsed.answer_markdown, "ok");
        assert_eq!(parsed.used_indices, vec![1]);
        assert_eq!(
            parsed.quotes,
            vec![ModelQuote {
                index: 1,
                quote: "hi".into()
            }]
        );
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_parse_is_idempotent() {
        assert_eq!(parse_model_output(FENCED), parse_model_output(FENCED));
    }

    #[test]
    fn test_prose_wrapped_and_uppercase_fence() {
        let text = "Sure! Here you go:\n{\"answer_markdown\":\"a\"}\nHope that helps.";
        let parsed = parse_model_output(text).unwrap();
        assert_eq!(parsed.answer_markdown, "a");
        assert!(parsed.used_indices.is_empty());
        assert!(parsed.quotes.is_empty());

        let text = "```JSON\n{\"answer_markdown\":\"b\",\"used_indices\":[2,2.0]}\n```";
        let parsed = parse_model_output(text).unwrap();
        assert_eq!(parsed.used_indices, vec![2, 2]);
    }

    #[test]
    fn test_no_braces() {
        assert_eq!(parse_model_output("not json"), Err(ParseFailure::NoJson));
        assert_eq!(parse_model_output(""), Err(ParseFailure::NoJson));
        assert_eq!(parse_model_output("} backwards {"), Err(ParseFailure::NoJson));
    }

    #[test]
    fn test_two_objects_is_syntax_error() {
        let text = r#"{"answer_markdown":"a"} and {"answer_markdown":"b"}"#;
        assert!(matches!(parse_model_output(text), Err(ParseFailure::Syntax(_))));
    }

    #[test]
    fn test_schema_violations() {
        for text in [
            r#"{"used_indices":[1]}"#,
            r#"{"answer_markdown":1}"#,
            r#"{"answer_markdown":"a","used_indices":[0]}"#,
            r#"{"answer_markdown":"a","used_indices":[1.5]}"#,
            r#"{"answer_markdown":"a","used_indices":null}"#,
            r#"{"answer_markdown":"a","quotes":[{"index":1}]}"#,
            r#"{"answer_markdown":"a","warnings":[1]}"#,
        ] {
            assert!(
                matches!(parse_model_output(text), Err(ParseFailure::Schema(_))),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_extra_keys_ignored() {
        let parsed =
            parse_model_output(r#"{"answer_markdown":"a","confidence":0.9,"used_indices":[3]}"#)
                .unwrap();
        assert_eq!(parsed.used_indices, vec![3]);
    }
}
