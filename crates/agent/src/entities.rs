use std::sync::OnceLock;

use regex::Regex;

use neubot_core::domain::query::{
    DateSpec, EntityBag, HomeAction, HomeDomain, TOKEN_PUNCTUATION,
};
use neubot_core::domain::tool::{tool_names, ToolKind, ToolSet};

use crate::trace::TraceRecorder;
use crate::vocabulary::{
    self, AREA_STOP_WORDS, HOME_VERBS, LOCATION_REJECT_WORDS, LOCATION_STOP_WORDS,
    MATH_OPERATOR_WORDS, QUERY_INDICATORS, SEARCH_INDICATORS, TOOL_KEYWORDS, WEATHER_HINTS,
};

fn preposition_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(?:in|at|for)\s+").ok()).as_ref()
}

fn word_match(text: &str, pattern: &str) -> bool {
    text.split(|ch: char| !ch.is_alphanumeric()).any(|word| word.eq_ignore_ascii_case(pattern))
}

fn title_case(word: &str) -> String {
    if word.chars().any(char::is_uppercase) {
        return word.to_string();
    }
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Place name after `in`/`at`/`for`, cut at the first stop word; otherwise
/// the first run of capitalised words that are not query vocabulary.
pub fn extract_location(text: &str) -> Option<String> {
    if let Some(pattern) = preposition_pattern() {
        for preposition in pattern.find_iter(text) {
            let tail = &text[preposition.end()..];
            let span_end = tail
                .find(|ch: char| {
                    !(ch.is_alphabetic() || ch.is_whitespace() || ch == '\'' || ch == '-')
                })
                .unwrap_or(tail.len());
            let kept: Vec<String> = tail[..span_end]
                .split_whitespace()
                .take_while(|word| !LOCATION_STOP_WORDS.contains(&word.to_lowercase().as_str()))
                .skip_while(|word| word.eq_ignore_ascii_case("the"))
                .map(title_case)
                .collect();
            if !kept.is_empty() {
                return Some(kept.join(" "));
            }
        }
    }

    capitalized_run(text)
}

fn rejects_as_place(word: &str) -> bool {
    let lower = word.to_lowercase();
    let lower = lower.as_str();
    LOCATION_REJECT_WORDS.contains(&lower)
        || LOCATION_STOP_WORDS.contains(&lower)
        || WEATHER_HINTS.contains(&lower)
        || vocabulary::lookup(QUERY_INDICATORS, lower).is_some()
        || vocabulary::lookup(TOOL_KEYWORDS, lower).is_some()
}

fn capitalized_run(text: &str) -> Option<String> {
    let mut run: Vec<&str> = Vec::new();

    for raw in text.split_whitespace() {
        let word = raw.trim_matches(TOKEN_PUNCTUATION);
        let qualifies = word.chars().count() >= 2
            && word.chars().next().is_some_and(char::is_uppercase)
            && word.chars().all(|ch| ch.is_alphabetic() || ch == '-')
            && !rejects_as_place(word);

        if qualifies {
            run.push(word);
        } else if !run.is_empty() {
            break;
        }

        if !run.is_empty() && raw.ends_with(TOKEN_PUNCTUATION) {
            break;
        }
    }

    (!run.is_empty()).then(|| run.join(" "))
}

/// `today`/`now` beat `tomorrow`; with neither the answer is today.
pub fn extract_date(text: &str) -> DateSpec {
    if word_match(text, "today") || word_match(text, "now") {
        DateSpec::Today
    } else if word_match(text, "tomorrow") {
        DateSpec::Tomorrow
    } else {
        DateSpec::Today
    }
}

/// Rewrites operator words as symbols and keeps only arithmetic characters.
/// Letters and sentence punctuation are dropped; any other symbol rejects
/// the whole text.
pub fn extract_math_expression(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    let mut rewritten: Vec<&str> = Vec::with_capacity(tokens.len());
    let mut index = 0;

    while index < tokens.len() {
        let pair = tokens.get(index + 1).map(|next| format!("{} {next}", tokens[index]));
        let phrase = pair.as_deref().and_then(|pair| vocabulary::lookup(MATH_OPERATOR_WORDS, pair));
        if let Some(symbol) = phrase {
            rewritten.push(symbol);
            index += 2;
            continue;
        }
        match vocabulary::lookup(MATH_OPERATOR_WORDS, tokens[index]) {
            Some(symbol) => rewritten.push(symbol),
            None => rewritten.push(tokens[index]),
        }
        index += 1;
    }

    let mut sanitized = String::with_capacity(lowered.len());
    for ch in rewritten.join(" ").chars() {
        match ch {
            '0'..='9' | '(' | ')' | '+' | '-' | '*' | '/' | '.' | ' ' => sanitized.push(ch),
            ch if ch.is_alphabetic() || ch.is_whitespace() => sanitized.push(' '),
            '?' | '!' | ',' | ';' | ':' | '=' | '\'' | '"' => sanitized.push(' '),
            _ => return None,
        }
    }

    let collapsed = sanitized.split_whitespace().collect::<Vec<_>>().join(" ");
    let expression = collapsed.trim_matches(|ch: char| ch == '.' || ch.is_whitespace());
    let has_operator = expression.contains(['+', '-', '*', '/']);
    let has_digit = expression.chars().any(|ch| ch.is_ascii_digit());

    (has_operator && has_digit).then(|| expression.to_string())
}

fn strip_leading_phrase<'a>(text: &'a str, phrase: &str) -> Option<&'a str> {
    if text == phrase {
        return Some("");
    }
    text.strip_prefix(phrase).filter(|rest| rest.starts_with(' ')).map(str::trim_start)
}

/// Free text for the web search tool, with request phrasing removed.
pub fn extract_search_query(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    let original = lowered.trim().trim_end_matches(TOKEN_PUNCTUATION).trim();

    let mut rest = original;
    for indicator in SEARCH_INDICATORS {
        if let Some(stripped) = strip_leading_phrase(rest, indicator) {
            rest = stripped;
        }
    }

    let terms = if rest != original {
        rest.to_string()
    } else {
        let padded = format!(" {original} ");
        SEARCH_INDICATORS
            .iter()
            .filter_map(|indicator| {
                padded.find(&format!(" {indicator} ")).map(|at| (at, at + indicator.len() + 1))
            })
            .min_by_key(|(at, _)| *at)
            .map(|(_, end)| padded[end..].trim().to_string())
            .unwrap_or_else(|| original.to_string())
    };

    let terms = terms.trim().to_string();
    (!terms.is_empty()).then_some(terms)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HomeEntities {
    pub action: Option<HomeAction>,
    pub domain: Option<HomeDomain>,
    pub area: Option<String>,
    pub device_phrase: Option<String>,
}

/// Longest verb phrase wins; bare on/off only when nothing else matched.
/// Returns the action and the token positions it consumed.
pub fn find_action(words: &[String]) -> Option<(HomeAction, Vec<usize>)> {
    for index in 0..words.len().saturating_sub(1) {
        let pair = format!("{} {}", words[index], words[index + 1]);
        let matched = HOME_VERBS.iter().find(|(verb, _)| verb.contains(' ') && *verb == pair);
        if let Some((_, action)) = matched {
            return Some((*action, vec![index, index + 1]));
        }
    }

    let bare = |verb: &str| verb == "on" || verb == "off";
    for pass_bare in [false, true] {
        for (index, word) in words.iter().enumerate() {
            let matched = HOME_VERBS
                .iter()
                .find(|(verb, _)| {
                    !verb.contains(' ') && bare(verb) == pass_bare && *verb == word.as_str()
                });
            if let Some((_, action)) = matched {
                return Some((*action, vec![index]));
            }
        }
    }
    None
}

pub fn extract_home(text: &str) -> HomeEntities {
    let words = vocabulary::words(text);
    let (action, consumed) = match find_action(&words) {
        Some((action, consumed)) => (Some(action), consumed),
        None => (None, Vec::new()),
    };

    let domain_at = words
        .iter()
        .enumerate()
        .filter(|(index, _)| !consumed.contains(index))
        .find_map(|(index, word)| vocabulary::domain_for(word).map(|domain| (index, domain)));

    let Some((position, domain)) = domain_at else {
        return HomeEntities { action, domain: None, area: None, device_phrase: None };
    };

    let area_words: Vec<&str> = words[position.saturating_sub(3)..position]
        .iter()
        .enumerate()
        .filter(|(offset, word)| {
            let index = position.saturating_sub(3) + offset;
            !consumed.contains(&index)
                && !AREA_STOP_WORDS.contains(&word.as_str())
                && !vocabulary::is_color(word)
                && vocabulary::lookup(HOME_VERBS, word.as_str()).is_none()
        })
        .map(|(_, word)| word.as_str())
        .collect();

    let area = (!area_words.is_empty()).then(|| area_words.join(" "));
    let device_phrase = area.as_ref().map(|area| format!("{area} {}", words[position]));

    HomeEntities { action, domain: Some(domain), area, device_phrase }
}

/// Runs the extractors the selected tools need and records what was found.
pub fn extract(
    text: &str,
    tools: &ToolSet,
    timezone: &str,
    trace: &mut TraceRecorder,
) -> EntityBag {
    trace.record("Extracting entities based on identified tools", tool_names(tools));
    let mut bag = EntityBag { user_timezone: Some(timezone.to_string()), ..EntityBag::default() };

    if tools.contains(&ToolKind::Weather) || tools.contains(&ToolKind::Time) {
        trace.note("Looking for location in query");
        bag.location = extract_location(text);
        match &bag.location {
            Some(location) => trace.record("Found location", location),
            None => trace.note("No location found"),
        }
    }

    if [ToolKind::Time, ToolKind::Date, ToolKind::Day].iter().any(|tool| tools.contains(tool)) {
        let date = extract_date(text);
        trace.record("Resolved date", date.as_str());
        bag.date = Some(date);
    }

    if tools.contains(&ToolKind::Calculator) {
        bag.math_expression = extract_math_expression(text);
        trace.record("Sanitized math expression", &bag.math_expression);
    }

    if tools.contains(&ToolKind::Search) {
        bag.search_query = extract_search_query(text);
    }

    if tools.contains(&ToolKind::HomeAssistant) {
        let home = extract_home(text);
        bag.ha_action = home.action;
        bag.ha_domain = home.domain;
        bag.ha_area = home.area;
        bag.ha_device_phrase = home.device_phrase;
    }

    trace.record("Extracted entities", &bag);
    bag
}
