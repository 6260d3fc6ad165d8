//! Oversized-content fragmentation (§4.C step 5): split on heading
//! boundaries, falling back to paragraph boundaries, so each fragment fits
//! a character budget approximating the configured token budget. Fragment
//! indices are contiguous and zero-based.

use regex::Regex;
use std::sync::OnceLock;

pub struct Fragment {
    pub index: u32,
    pub content: String,
}

/// `char_budget` is the caller's token budget already expanded to
/// characters (roughly `tokens * 4`, per `FragmenterConfig`).
pub fn fragment(text: &str, char_budget: usize) -> Vec<Fragment> {
    let char_budget = char_budget.max(1);
    if text.chars().count() <= char_budget {
        return vec![Fragment { index: 0, content: text.to_string() }];
    }

    let mut pieces = Vec::new();
    for section in split_on_headings(text) {
        if section.chars().count() <= char_budget {
            push_nonempty(&mut pieces, section);
            continue;
        }
        for paragraph in split_on_paragraphs(&section) {
            if paragraph.chars().count() <= char_budget {
                push_nonempty(&mut pieces, paragraph);
            } else {
                for chunk in hard_wrap(&paragraph, char_budget) {
                    push_nonempty(&mut pieces, chunk);
                }
            }
        }
    }
    if pieces.is_empty() {
        pieces.push(text.to_string());
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, content)| Fragment { index: index as u32, content })
        .collect()
}

fn push_nonempty(pieces: &mut Vec<String>, text: String) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
}

fn split_on_headings(text: &str) -> Vec<String> {
    let mut starts: Vec<usize> = heading_re().find_iter(text).map(|m| m.start()).collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }
    starts.push(text.len());

    starts
        .windows(2)
        .map(|window| text[window[0]..window[1]].to_string())
        .collect()
}

fn split_on_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n").map(|s| s.to_string()).collect()
}

fn hard_wrap(text: &str, char_budget: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(char_budget).map(|c| c.iter().collect()).collect()
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#{1,6} .*$").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_within_budget_is_a_single_fragment() {
        let pieces = fragment("short content", 1000);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].index, 0);
    }

    #[test]
    fn oversized_content_splits_on_headings() {
        let text = format!("# One\n{}\n# Two\n{}", "a".repeat(50), "b".repeat(50));
        let pieces = fragment(&text, 60);
        assert!(pieces.len() >= 2);
        assert!(pieces[0].content.starts_with("# One"));
        assert_eq!(pieces.iter().map(|p| p.index).collect::<Vec<_>>(), (0..pieces.len() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn heading_section_still_oversized_falls_back_to_paragraphs() {
        let text = format!("# Big\n{}\n\n{}", "a".repeat(80), "b".repeat(80));
        let pieces = fragment(&text, 90);
        assert!(pieces.len() >= 2);
    }

    #[test]
    fn single_giant_paragraph_is_hard_wrapped() {
        let text = "x".repeat(250);
        let pieces = fragment(&text, 100);
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|p| p.content.chars().count() <= 100));
    }
}
