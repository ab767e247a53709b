use std::collections::HashMap;

use once_cell::sync::Lazy;
use qa_core::{AnswerCitation, RetrievedItem};
use regex::Regex;

use crate::parse::ModelQuote;
use crate::snippet::truncate_chars;

pub const MAX_QUOTE_CHARS: usize = 200;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s").expect("static sentence pattern"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationOutcome {
    pub citations: Vec<AnswerCitation>,
    pub warnings: Vec<String>,
}

/// 从证据片段中截取第一句作为引文；片段为空时返回 `None`
pub fn derive_quote(snippet: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(snippet, " ");
    let collapsed = collapsed.trim();
    if collapsed.is_empty() {
        return None;
    }
    // 句末标点位于开头时视为没有找到
    let candidate = match SENTENCE_END.find(collapsed) {
        Some(m) if m.start() > 0 => &collapsed[..=m.start()],
        _ => collapsed,
    };
    Some(truncate_chars(candidate, MAX_QUOTE_CHARS))
}

/// 把模型声明的证据编号映射回检索结果。
///
/// 越界编号只产生警告；重复编号产生重复引用。`retrieved` 必须是面向模型的那份证据，
/// 这样即使调用方隐藏了片段，引文仍能从完整片段中推导。
pub fn build_citations(
    used_indices: &[u64],
    quotes: &[ModelQuote],
    retrieved: &[RetrievedItem],
) -> CitationOutcome {
    // 同一编号出现多次时以最后一条为准
    let declared: HashMap<u64, &str> = quotes
        .iter()
        .map(|q| (q.index, q.quote.as_str()))
        .collect();

    let mut outcome = CitationOutcome::default();
    for &index in used_indices {
        let item = usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| retrieved.get(i));
        let Some(item) = item else {
            outcome
                .warnings
                .push(format!("Citation index {} is out of range.", index));
            continue;
        };

        let quote = match declared.get(&index) {
            Some(q) if !q.is_empty() => Some(truncate_chars(q, MAX_QUOTE_CHARS)),
            _ => derive_quote(&item.snippet),
        };
        outcome.citations.push(AnswerCitation {
            id: item.id.clone(),
            title: item.title.clone(),
            url: item.url.clone(),
            quote,
        });
    }
    outcome
}
