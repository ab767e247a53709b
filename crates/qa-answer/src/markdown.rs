//! Markdown → 纯文本，用于构造证据片段。
//!
//! 代码块整体保留（去掉围栏行），链接与图片保留 URL，其余标记剥离。

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static markdown pattern")
}

static BACKTICK_FENCE: Lazy<Regex> = Lazy::new(|| re(r"(?s)```.*?```"));
static TILDE_FENCE: Lazy<Regex> = Lazy::new(|| re(r"(?s)~~~.*?~~~"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| re(r"`([^`]+)`"));
static IMAGE: Lazy<Regex> = Lazy::new(|| re(r"!\[([^\]]*)\]\(([^)]+)\)"));
static LINK: Lazy<Regex> = Lazy::new(|| re(r"\[([^\]]+)\]\(([^)]+)\)"));
static AUTOLINK: Lazy<Regex> = Lazy::new(|| re(r"<((?:https?://|mailto:)[^>]+)>"));
static HEADING: Lazy<Regex> = Lazy::new(|| re(r"(?m)^\s{0,3}#{1,6}\s+"));
static BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| re(r"(?m)^\s{0,3}>\s?"));
static BULLET: Lazy<Regex> = Lazy::new(|| re(r"(?m)^\s{0,3}[-*+]\s+"));
static ORDERED: Lazy<Regex> = Lazy::new(|| re(r"(?m)^\s{0,3}\d+\.\s+"));
static STRONG_STAR: Lazy<Regex> = Lazy::new(|| re(r"\*\*(.*?)\*\*"));
static STRONG_UNDERSCORE: Lazy<Regex> = Lazy::new(|| re(r"__(.*?)__"));
static EM_STAR: Lazy<Regex> = Lazy::new(|| re(r"\*(.*?)\*"));
static EM_UNDERSCORE: Lazy<Regex> = Lazy::new(|| re(r"_(.*?)_"));
static STRIKE: Lazy<Regex> = Lazy::new(|| re(r"~~(.*?)~~"));
static TRAILING_SPACE: Lazy<Regex> = Lazy::new(|| re(r"[ \t]+\n"));
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| re(r"\n{3,}"));
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| re(r"@@CODEBLOCK(\d+)@@"));

pub fn markdown_to_text(markdown: &str) -> String {
    if markdown.is_empty() {
        return String::new();
    }

    let mut code_blocks: Vec<String> = Vec::new();
    let text = stash_fences(&BACKTICK_FENCE, markdown, &mut code_blocks);
    let text = stash_fences(&TILDE_FENCE, &text, &mut code_blocks);

    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = IMAGE.replace_all(&text, |caps: &Captures| {
        let alt = caps[1].trim();
        let alt = if alt.is_empty() { "image" } else { alt };
        with_url(alt, caps[2].trim())
    });
    let text = LINK.replace_all(&text, |caps: &Captures| {
        with_url(caps[1].trim(), caps[2].trim())
    });
    let text = AUTOLINK.replace_all(&text, "$1");
    let text = HEADING.replace_all(&text, "");
    let text = BLOCKQUOTE.replace_all(&text, "");
    let text = BULLET.replace_all(&text, "");
    let text = ORDERED.replace_all(&text, "");
    let text = STRONG_STAR.replace_all(&text, "$1");
    let text = STRONG_UNDERSCORE.replace_all(&text, "$1");
    let text = EM_STAR.replace_all(&text, "$1");
    let text = EM_UNDERSCORE.replace_all(&text, "$1");
    let text = STRIKE.replace_all(&text, "$1");
    let text = TRAILING_SPACE.replace_all(&text, "\n");
    let text = BLANK_RUN.replace_all(&text, "\n\n");
    let text = text.trim();

    let restored = PLACEHOLDER.replace_all(text, |caps: &Captures| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|idx| code_blocks.get(idx))
            .cloned()
            .unwrap_or_default()
    });
    restored.trim().to_string()
}

fn with_url(label: &str, url: &str) -> String {
    if url.is_empty() {
        label.to_string()
    } else {
        format!("{} ({})", label, url)
    }
}

/// 把围栏代码块替换为占位符，内容（去掉首尾围栏行）存入 `blocks`
fn stash_fences(pattern: &Regex, input: &str, blocks: &mut Vec<String>) -> String {
    pattern
        .replace_all(input, |caps: &Captures| {
            let lines: Vec<&str> = caps[0]
                .split('\n')
                .map(|l| l.strip_suffix('\r').unwrap_or(l))
                .collect();
            let inner = if lines.len() > 2 {
                lines[1..lines.len() - 1].join("\n")
            } else {
                String::new()
            };
            let placeholder = format!("\n@@CODEBLOCK{}@@\n", blocks.len());
            blocks.push(inner);
            placeholder
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_code_urls_preserved() {
        let out = markdown_to_text("Visit `https://a2a.example/docs` for docs.");
        assert_eq!(out, "Visit https://a2a.example/docs for docs.");

        let out = markdown_to_text("Run: `curl https://example.com --flag` now.");
        assert!(out.contains("curl https://example.com --flag"));
    }

    #[test]
    fn test_fenced_code_block_kept() {
        let out = markdown_to_text("Example:\n```bash\ncurl -sS https://example.com\n```\nDone.");
        assert_eq!(out, "Example:\n\ncurl -sS https://example.com\n\nDone.");

        let out = markdown_to_text("~~~\n**not bold**\n~~~");
        assert_eq!(out, "**not bold**");
    }

    #[test]
    fn test_links_and_images() {
        assert_eq!(
            markdown_to_text("[OpenAPI](/api/openapi.json)"),
            "OpenAPI (/api/openapi.json)"
        );
        assert_eq!(
            markdown_to_text("![](https://img.example/a.png)"),
            "image (https://img.example/a.png)"
        );
        assert_eq!(
            markdown_to_text("see <https://a2a.example>"),
            "see https://a2a.example"
        );
    }

    #[test]
    fn test_block_markers_and_emphasis() {
        let md = "# Title\n> quoted\n- one\n2. two\n**bold** __strong__ *em* ~~gone~~";
        assert_eq!(
            markdown_to_text(md),
            "Title\nquoted\none\ntwo\nbold strong em gone"
        );
    }

    #[test]
    fn test_whitespace_normalisation() {
        assert_eq!(markdown_to_text("a   \n\n\n\nb"), "a\n\nb");
        assert_eq!(markdown_to_text(""), "");
        assert_eq!(markdown_to_text("   "), "");
    }
}
