//! Source-specific cleanup heuristics (§4.C step 4): pluggable, idempotent,
//! and conservative. Well-known boilerplate — citation markers, trailing
//! "See also"/"References" chrome, interwiki navigation text — is stripped
//! only once at least two independent signals fire, so an isolated "[3]"
//! in an otherwise ordinary entry is left untouched.

use regex::Regex;
use std::sync::OnceLock;

const SECTION_MARKERS: &[&str] = &["See also", "References", "External links"];

pub fn cleanup(text: &str) -> String {
    let signals = Signals::detect(text);
    if signals.count() < 2 {
        return text.to_string();
    }

    let mut cleaned = text.to_string();
    if signals.citation_numbers {
        cleaned = citation_re().replace_all(&cleaned, "").to_string();
    }
    if signals.section_chrome {
        cleaned = strip_after_section_markers(&cleaned);
    }
    if signals.interwiki_nav {
        cleaned = interwiki_re().replace_all(&cleaned, "").to_string();
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Signals {
    citation_numbers: bool,
    section_chrome: bool,
    interwiki_nav: bool,
}

impl Signals {
    fn detect(text: &str) -> Self {
        Self {
            citation_numbers: citation_re().find_iter(text).count() >= 3,
            section_chrome: SECTION_MARKERS.iter().any(|marker| text.contains(marker)),
            interwiki_nav: interwiki_re().find_iter(text).count() >= 2,
        }
    }

    fn count(&self) -> u32 {
        [self.citation_numbers, self.section_chrome, self.interwiki_nav]
            .iter()
            .filter(|signal| **signal)
            .count() as u32
    }
}

fn strip_after_section_markers(text: &str) -> String {
    let cut = SECTION_MARKERS
        .iter()
        .filter_map(|marker| text.find(marker))
        .min()
        .unwrap_or(text.len());
    text[..cut].trim_end().to_string()
}

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\d{1,3}\]").unwrap())
}

fn interwiki_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(jump to navigation|jump to search|main page|random article)\b").unwrap())
}
