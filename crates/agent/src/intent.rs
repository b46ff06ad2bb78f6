use std::sync::OnceLock;

use regex::Regex;

use neubot_core::domain::query::{clean_token, TOKEN_PUNCTUATION};
use neubot_core::domain::tool::{tool_names, ToolKind, ToolSet};

use crate::trace::TraceRecorder;
use crate::vocabulary::{
    self, DATE_HINTS, DAY_HINTS, DISABLE_PHRASE, GREETING_PHRASES, HOME_TRIGGER_VERBS,
    QUERY_INDICATORS, TIME_HINTS, TOOL_KEYWORDS, WEATHER_HINTS,
};

pub const UNKNOWN_QUERY: &str = "unknown_query";

fn math_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)[\d)]\s*(?:[+*/-]|\bplus\b|\bminus\b|\btimes\b|\bmultiplied by\b|\bdivided by\b|\bover\b)\s*[(\d]",
            )
            .ok()
        })
        .as_ref()
}

/// Lower-case text with punctuation removed and whitespace collapsed.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .chars()
        .map(|ch| if TOKEN_PUNCTUATION.contains(&ch) { ' ' } else { ch })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn is_disable_phrase(text: &str) -> bool {
    normalize(text).contains(DISABLE_PHRASE)
}

fn leading_greeting(normalized: &str) -> Option<&'static str> {
    GREETING_PHRASES.iter().copied().find(|phrase| {
        normalized == *phrase
            || normalized
                .strip_prefix(phrase)
                .is_some_and(|rest| rest.starts_with(' '))
    })
}

/// Greeting with nothing else worth routing: an exact greeting phrase, or a
/// greeting opener in an utterance of at most two words.
pub fn is_greeting_only(text: &str) -> bool {
    let normalized = normalize(text);
    match leading_greeting(&normalized) {
        Some(phrase) => normalized == phrase || normalized.split(' ').count() <= 2,
        None => false,
    }
}

pub fn contains_greeting(text: &str) -> bool {
    leading_greeting(&normalize(text)).is_some()
}

pub fn query_type(tokens: &[&str], trace: &mut TraceRecorder) -> &'static str {
    let leading: Vec<&str> = tokens.iter().take(3).copied().collect();
    trace.record("Looking for query indicators", &leading);

    for token in leading {
        let word = clean_token(token);
        if let Some(kind) = vocabulary::lookup(QUERY_INDICATORS, word.as_str()) {
            trace.record(format!("Found query indicator '{word}'"), kind);
            return kind;
        }
    }

    trace.record("No clear query indicator found", UNKNOWN_QUERY);
    UNKNOWN_QUERY
}

pub fn has_math(text: &str) -> bool {
    math_pattern().is_some_and(|pattern| pattern.is_match(text))
}

/// Domain vocabulary and an action verb on different tokens.
pub fn has_home_command(words: &[String]) -> bool {
    let domain_positions: Vec<usize> = words
        .iter()
        .enumerate()
        .filter(|(_, word)| vocabulary::domain_for(word).is_some())
        .map(|(index, _)| index)
        .collect();

    words.iter().enumerate().any(|(index, word)| {
        HOME_TRIGGER_VERBS.contains(&word.as_str())
            && domain_positions.iter().any(|position| *position != index)
    })
}

/// Builds the candidate tool set: explicit keywords, then category hints
/// when nothing explicit was found, then the calculator and smart-home rules.
/// The search fallback is applied later, once arguments are known.
pub fn identify_tools(text: &str, query_type: &str, trace: &mut TraceRecorder) -> ToolSet {
    trace.note("Looking for tool references in query");
    let words = vocabulary::words(text);
    let mut tools = ToolSet::new();

    for word in &words {
        if let Some(tool) = vocabulary::lookup(TOOL_KEYWORDS, word.as_str()) {
            if tools.insert(tool) {
                trace.record("Found tool reference", tool.as_str());
            }
        }
    }

    if tools.is_empty() {
        trace.note("No explicit tools found, inferring from context");
        let mentions = |hints: &[&str]| words.iter().any(|word| hints.contains(&word.as_str()));

        let inferred = if query_type == "time_query" || mentions(TIME_HINTS) {
            Some(ToolKind::Time)
        } else if mentions(WEATHER_HINTS) {
            Some(ToolKind::Weather)
        } else if mentions(DATE_HINTS) {
            Some(ToolKind::Date)
        } else if mentions(DAY_HINTS) {
            Some(ToolKind::Day)
        } else {
            None
        };

        if let Some(tool) = inferred {
            tools.insert(tool);
            trace.record("Inferred tool from context", tool.as_str());
        }
    }

    if has_math(text) && tools.insert(ToolKind::Calculator) {
        trace.record("Detected arithmetic", ToolKind::Calculator.as_str());
    }

    if has_home_command(&words) && tools.insert(ToolKind::HomeAssistant) {
        trace.record("Detected smart-home command", ToolKind::HomeAssistant.as_str());
    }

    if tools.is_empty() {
        trace.note("No specific tools referenced");
    } else {
        trace.record("Candidate tools", tool_names(&tools));
    }
    tools
}
