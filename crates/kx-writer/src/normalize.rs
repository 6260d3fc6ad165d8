//! Content normalization by media type (§4.C step 3). HTML is flattened to
//! plain text with script/style content dropped and whitespace collapsed;
//! Markdown and plain text pass through untouched.

use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;

/// Returns the normalized content and, when the media type changed,
/// `Some(original_content_type)` to record on the entry.
pub fn normalize(content: &[u8], content_type: &str) -> (Vec<u8>, Option<String>) {
    if !is_html(content_type) {
        return (content.to_vec(), None);
    }
    let raw = String::from_utf8_lossy(content);
    let without_script_style = script_style_re().replace_all(&raw, "");
    let text = extract_text(&without_script_style);
    (collapse_whitespace(&text).into_bytes(), Some(content_type.to_string()))
}

fn is_html(content_type: &str) -> bool {
    content_type.eq_ignore_ascii_case("text/html") || content_type.eq_ignore_ascii_case("application/xhtml+xml")
}

fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document.root_element().text().collect::<Vec<_>>().join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</\1>").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through_untouched() {
        let (out, original) = normalize(b"hello   world", "text/plain");
        assert_eq!(out, b"hello   world");
        assert_eq!(original, None);
    }

    #[test]
    fn html_is_flattened_and_original_type_recorded() {
        let html = b"<html><body><h1>Title</h1><p>Some   text.</p></body></html>";
        let (out, original) = normalize(html, "text/html");
        assert_eq!(String::from_utf8(out).unwrap(), "Title Some text.");
        assert_eq!(original, Some("text/html".to_string()));
    }

    #[test]
    fn script_and_style_content_is_dropped() {
        let html = b"<html><body><script>evil()</script><style>.x{color:red}</style><p>keep me</p></body></html>";
        let (out, _) = normalize(html, "text/html");
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "keep me");
    }
}
