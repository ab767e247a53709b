use qa_core::{AnswerResponse, RetrievedItem};

pub const NO_MATCHES_ANSWER: &str = "No matching threads were found for this query.";

/// 不经过模型、直接由检索结果拼出的回答；不附带任何引用。
///
/// `retrieved` 应是调用方可见的那份证据。
pub fn evidence_only_answer(
    query: &str,
    retrieved: Vec<RetrievedItem>,
    warnings: Vec<String>,
    message: &str,
) -> AnswerResponse {
    let answer_markdown = if retrieved.is_empty() {
        NO_MATCHES_ANSWER.to_string()
    } else {
        let bullets = retrieved
            .iter()
            .map(|item| {
                if item.snippet.is_empty() {
                    format!("- [{}]({})", item.title, item.url)
                } else {
                    format!("- [{}]({})\n{}", item.title, item.url, item.snippet)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("{}\n\n{}", message, bullets)
    };

    AnswerResponse {
        query: query.to_string(),
        answer_markdown,
        citations: Vec::new(),
        retrieved,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, snippet: &str) -> RetrievedItem {
        RetrievedItem {
            id: id.into(),
            title: format!("Title {}", id),
            url: format!("https://x.example/q/{}", id),
            snippet: snippet.into(),
        }
    }

    #[test]
    fn test_no_matches() {
        let resp = evidence_only_answer("demo", vec![], vec!["w".into()], "ignored");
        assert_eq!(resp.answer_markdown, NO_MATCHES_ANSWER);
        assert!(resp.citations.is_empty());
        assert!(resp.retrieved.is_empty());
        assert_eq!(resp.warnings, vec!["w"]);
    }

    #[test]
    fn test_bullets_with_and_without_snippets() {
        let resp = evidence_only_answer(
            "demo",
            vec![item("a", "snippet a"), item("b", "")],
            vec![],
            "LLM disabled; returning retrieved evidence only.",
        );
        assert_eq!(
            resp.answer_markdown,
            "LLM disabled; returning retrieved evidence only.\n\n\
- [Title a](https://x.example/q/a)\nsnippet a\n\n\
- [Title b](https://x.example/q/b)"
        );
        assert!(resp.citations.is_empty());
        assert_eq!(resp.retrieved.len(), 2);
        assert_eq!(resp.query, "demo");
    }
}
