//! Display copy of a query with recognised words wrapped in `<span>` tags.
//!
//! Spans never overlap and the original characters are emitted unchanged,
//! so the plain query is always a subsequence of the highlighted one.

use std::sync::OnceLock;

use regex::Regex;

use crate::intent::has_math;
use crate::vocabulary::{HIGHLIGHT_INDICATORS, HIGHLIGHT_TOOL_WORDS};

pub const QUERY_INDICATOR: &str = "query-indicator";
pub const TOOL_REFERENCE: &str = "tool-reference";
pub const ATTRIBUTE: &str = "attribute";
pub const MATH_OPERATOR: &str = "math-operator";

fn word_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z0-9']+").ok()).as_ref()
}

fn operator_word_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)\b(?:multiplied\s+by|divided\s+by|plus|minus|times|over)\b").ok()
        })
        .as_ref()
}

#[derive(Clone, Copy, Debug)]
struct Span {
    start: usize,
    end: usize,
    class: &'static str,
}

#[derive(Debug, Default)]
struct Spans(Vec<Span>);

impl Spans {
    /// First claim on a region wins.
    fn claim(&mut self, start: usize, end: usize, class: &'static str) {
        if start >= end || self.0.iter().any(|span| span.start < end && start < span.end) {
            return;
        }
        self.0.push(Span { start, end, class });
    }
}

fn is_operand_edge(ch: Option<char>, opening: bool) -> bool {
    match ch {
        Some(ch) if ch.is_ascii_digit() => true,
        Some('(') => opening,
        Some(')') => !opening,
        _ => false,
    }
}

/// Operator symbols sitting between two operands, ignoring spaces.
fn operator_symbols(text: &str) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    for (index, ch) in text.char_indices() {
        if !matches!(ch, '+' | '-' | '*' | '/') {
            continue;
        }
        let before = text[..index].chars().rev().find(|c| *c != ' ');
        let after = text[index + ch.len_utf8()..].chars().find(|c| *c != ' ');
        if is_operand_edge(before, false) && is_operand_edge(after, true) {
            found.push((index, index + ch.len_utf8()));
        }
    }
    found
}

pub fn highlight(text: &str, location: Option<&str>) -> String {
    let mut spans = Spans::default();

    if let Some(location) = location.map(str::trim).filter(|location| !location.is_empty()) {
        let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(location)));
        if let Ok(pattern) = pattern {
            for found in pattern.find_iter(text) {
                spans.claim(found.start(), found.end(), ATTRIBUTE);
            }
        }
    }

    if let Some(pattern) = word_pattern() {
        for found in pattern.find_iter(text) {
            let word = found.as_str().to_lowercase();
            let class = if HIGHLIGHT_INDICATORS.contains(&word.as_str()) {
                QUERY_INDICATOR
            } else if HIGHLIGHT_TOOL_WORDS.contains(&word.as_str()) {
                TOOL_REFERENCE
            } else {
                continue;
            };
            spans.claim(found.start(), found.end(), class);
        }
    }

    if has_math(text) {
        if let Some(pattern) = operator_word_pattern() {
            for found in pattern.find_iter(text) {
                spans.claim(found.start(), found.end(), MATH_OPERATOR);
            }
        }
        for (start, end) in operator_symbols(text) {
            spans.claim(start, end, MATH_OPERATOR);
        }
    }

    let mut ordered = spans.0;
    ordered.sort_by_key(|span| span.start);

    let mut out = String::with_capacity(text.len() + ordered.len() * 32);
    let mut cursor = 0;
    for span in ordered {
        out.push_str(&text[cursor..span.start]);
        out.push_str(&format!(r#"<span class="{}">{}</span>"#, span.class, &text[span.start..span.end]));
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::highlight;

    fn is_subsequence(needle: &str, haystack: &str) -> bool {
        let mut rest = haystack.chars();
        needle.chars().all(|ch| rest.any(|other| other == ch))
    }

    #[test]
    fn wraps_indicators_tools_and_location() {
        assert_eq!(
            highlight("What is the time in Tokyo?", Some("Tokyo")),
            concat!(
                r#"<span class="query-indicator">What</span> "#,
                r#"<span class="query-indicator">is</span> the "#,
                r#"<span class="tool-reference">time</span> in "#,
                r#"<span class="attribute">Tokyo</span>?"#
            )
        );
    }

    #[test]
    fn location_matches_case_insensitively_and_keeps_original_text() {
        let marked = highlight("weather in new york", Some("New York"));
        assert!(marked.ends_with(r#"<span class="attribute">new york</span>"#));
    }

    #[test]
    fn math_operators_only_between_operands() {
        assert_eq!(
            highlight("5 + 3", None),
            r#"5 <span class="math-operator">+</span> 3"#
        );
        assert_eq!(
            highlight("what is 6 times 7", None),
            concat!(
                r#"<span class="query-indicator">what</span> "#,
                r#"<span class="query-indicator">is</span> 6 "#,
                r#"<span class="math-operator">times</span> 7"#
            )
        );
        assert_eq!(highlight("a well-known fact", None), "a well-known fact");
    }

    #[test]
    fn original_text_survives_as_subsequence() {
        for query in [
            "What's the weather in Paris and the time in Oslo?",
            "(2 + 3) * 4",
            "turn on the desk light",
            "",
        ] {
            let marked = highlight(query, Some("Paris"));
            assert!(is_subsequence(query, &marked), "{query} -> {marked}");
        }
    }
}
