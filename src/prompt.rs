//! Free-text prompt conversion between formats

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

use crate::profile::PromptFormat;

static FENCED_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#+\s+").unwrap());
static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`(.*?)`").unwrap());

/// A prompt loaded from an application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub path: PathBuf,
}

/// Convert prompt text written in `from` for an application expecting `to`
pub fn convert(text: &str, from: PromptFormat, to: PromptFormat) -> String {
    match (from, to) {
        (PromptFormat::Markdown, PromptFormat::Text) => strip_markdown(text),
        _ => text.to_string(),
    }
}

/// Remove headers, emphasis, fenced code blocks and inline code markers
pub fn strip_markdown(text: &str) -> String {
    let text = FENCED_CODE_RE.replace_all(text, "");
    let text = HEADER_RE.replace_all(&text, "");
    let text = BOLD_RE.replace_all(&text, "$1");
    let text = ITALIC_RE.replace_all(&text, "$1");
    INLINE_CODE_RE.replace_all(&text, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markdown() {
        let markdown = "\
# Role
You are a **careful** reviewer.

## Rules
- Prefer *small* changes
- Run `cargo test` first

```bash
rm -rf /
```
Done.";

        assert_eq!(
            strip_markdown(markdown),
            "\
Role
You are a careful reviewer.

Rules
- Prefer small changes
- Run cargo test first


Done."
        );
    }

    #[test]
    fn test_convert_only_strips_for_plain_text() {
        let text = "# Title\n**bold**";

        assert_eq!(
            convert(text, PromptFormat::Markdown, PromptFormat::Text),
            "Title\nbold"
        );
        assert_eq!(convert(text, PromptFormat::Markdown, PromptFormat::Markdown), text);
        assert_eq!(convert(text, PromptFormat::Text, PromptFormat::Text), text);
    }
}
