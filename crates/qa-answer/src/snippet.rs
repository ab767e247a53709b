use qa_core::{Reply, Thread};

use crate::markdown::markdown_to_text;

pub const ELLIPSIS: char = '…';

/// 每个帖子最多取的回复数
const MAX_REPLIES: usize = 2;

/// 按字符数截断；超长时保留 `max_chars - 1` 个字符并追加省略号
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    let mut out = cut.trim_end().to_string();
    out.push(ELLIPSIS);
    out
}

/// 把一个帖子转换成长度受限的证据文本块。
///
/// 依次输出标题、问题正文，以及纯文本最长的两条回复（相同长度保持原顺序），
/// 段落之间以空行分隔，最后按 `max_chars` 截断。
pub fn build_evidence_snippet(thread: &Thread, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !thread.title.is_empty() {
        parts.push(format!("Title: {}", thread.title));
    }

    let question = markdown_to_text(thread.body_source());
    if !question.is_empty() {
        parts.push(format!("Question:\n{}", question));
    }

    for (i, text) in top_replies(&thread.answers).into_iter().enumerate() {
        if !text.is_empty() {
            parts.push(format!("Answer {}:\n{}", i + 1, text));
        }
    }

    let raw = parts.join("\n\n");
    truncate_chars(raw.trim(), max_chars)
}

fn top_replies(replies: &[Reply]) -> Vec<String> {
    let mut texts: Vec<String> = replies
        .iter()
        .map(|r| markdown_to_text(r.body_source()))
        .collect();
    // sort_by 是稳定排序
    texts.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    texts.truncate(MAX_REPLIES);
    texts
}
