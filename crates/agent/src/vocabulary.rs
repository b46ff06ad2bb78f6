//! Fixed word tables shared by intent detection, extraction and highlighting.

use neubot_core::domain::query::{clean_token, HomeAction, HomeDomain};
use neubot_core::domain::tool::ToolKind;

/// Leading-word classification. Only the first three tokens are consulted.
pub const QUERY_INDICATORS: &[(&str, &str)] = &[
    ("what", "information_query"),
    ("what's", "information_query"),
    ("how", "information_query"),
    ("when", "time_query"),
    ("where", "location_query"),
    ("who", "person_query"),
    ("why", "reason_query"),
    ("is", "confirmation_query"),
    ("can", "capability_query"),
    ("could", "capability_query"),
    ("will", "future_query"),
    ("would", "hypothetical_query"),
    ("should", "recommendation_query"),
    ("tell", "command_query"),
    ("show", "command_query"),
    ("find", "command_query"),
    ("get", "command_query"),
    ("search", "command_query"),
    ("turn", "command_query"),
    ("set", "command_query"),
    ("play", "command_query"),
    ("hello", "greeting"),
    ("hi", "greeting"),
    ("hey", "greeting"),
    ("calculate", "calculation_query"),
    ("compute", "calculation_query"),
];

/// Literal tool keywords matched against every cleaned token.
pub const TOOL_KEYWORDS: &[(&str, ToolKind)] = &[
    ("time", ToolKind::Time),
    ("weather", ToolKind::Weather),
    ("date", ToolKind::Date),
    ("day", ToolKind::Day),
    ("search", ToolKind::Search),
    ("calc", ToolKind::Calculator),
    ("calculate", ToolKind::Calculator),
    ("calculator", ToolKind::Calculator),
    ("compute", ToolKind::Calculator),
    ("homeassistant", ToolKind::HomeAssistant),
    ("music", ToolKind::Music),
    ("spotify", ToolKind::Music),
    ("song", ToolKind::Music),
    ("track", ToolKind::Music),
    ("playlist", ToolKind::Music),
];

pub const TIME_HINTS: &[&str] = &["clock", "o'clock", "hour"];
pub const WEATHER_HINTS: &[&str] =
    &["temperature", "forecast", "rain", "raining", "snow", "snowing", "humidity", "sunny"];
pub const DATE_HINTS: &[&str] = &["calendar", "month", "year"];
pub const DAY_HINTS: &[&str] = &["weekday", "today", "tomorrow"];

pub const GREETING_PHRASES: &[&str] = &[
    "good morning",
    "good afternoon",
    "good evening",
    "hello there",
    "hi there",
    "hey there",
    "what's up",
    "greetings",
    "howdy",
    "hello",
    "hiya",
    "hey",
    "hi",
    "yo",
];

pub const GREETING_REPLIES: &[&str] =
    &["Hello!", "Hi there!", "Hey!", "Greetings!", "Hello, nice to hear from you!"];

pub const HELP_SUFFIX: &str =
    "Ask me for the time or weather somewhere, a quick calculation, a web search, or to control your lights.";

pub const DISABLE_PHRASE: &str = "disable thinking";

/// Ordered; stripped repeatedly from the front of a search request.
pub const SEARCH_INDICATORS: &[&str] = &[
    "search the web for",
    "search for",
    "search",
    "look up",
    "tell me about",
    "find me",
    "find",
    "show me",
    "show",
    "get",
    "what is",
    "what's",
    "who is",
    "who's",
    "where is",
];

pub const LOCATION_STOP_WORDS: &[&str] = &[
    "and", "with", "at", "is", "are", "was", "were", "then", "today", "tomorrow", "right", "now",
    "please",
];

pub const LOCATION_REJECT_WORDS: &[&str] =
    &["what", "where", "when", "how", "why", "the", "weather", "time"];

/// Two-word phrases first, then single verbs, then bare on/off.
pub const HOME_VERBS: &[(&str, HomeAction)] = &[
    ("turn on", HomeAction::TurnOn),
    ("turn off", HomeAction::TurnOff),
    ("switch on", HomeAction::TurnOn),
    ("switch off", HomeAction::TurnOff),
    ("power on", HomeAction::TurnOn),
    ("power off", HomeAction::TurnOff),
    ("shut off", HomeAction::TurnOff),
    ("activate", HomeAction::TurnOn),
    ("enable", HomeAction::TurnOn),
    ("start", HomeAction::TurnOn),
    ("run", HomeAction::TurnOn),
    ("set", HomeAction::TurnOn),
    ("dim", HomeAction::TurnOn),
    ("brighten", HomeAction::TurnOn),
    ("open", HomeAction::TurnOn),
    ("deactivate", HomeAction::TurnOff),
    ("disable", HomeAction::TurnOff),
    ("stop", HomeAction::TurnOff),
    ("close", HomeAction::TurnOff),
    ("kill", HomeAction::TurnOff),
    ("on", HomeAction::TurnOn),
    ("off", HomeAction::TurnOff),
];

/// Tokens that count as an action verb for the smart-home co-occurrence rule.
pub const HOME_TRIGGER_VERBS: &[&str] =
    &["turn", "switch", "activate", "set", "dim", "brighten", "open", "close", "on", "off"];

pub const HOME_DOMAIN_SYNONYMS: &[(&str, HomeDomain)] = &[
    ("light", HomeDomain::Light),
    ("lights", HomeDomain::Light),
    ("lamp", HomeDomain::Light),
    ("lamps", HomeDomain::Light),
    ("bulb", HomeDomain::Light),
    ("bulbs", HomeDomain::Light),
    ("downlight", HomeDomain::Light),
    ("downlights", HomeDomain::Light),
    ("lighting", HomeDomain::Light),
    ("fan", HomeDomain::Fan),
    ("fans", HomeDomain::Fan),
    ("switch", HomeDomain::Switch),
    ("switches", HomeDomain::Switch),
    ("plug", HomeDomain::Switch),
    ("plugs", HomeDomain::Switch),
    ("outlet", HomeDomain::Switch),
    ("outlets", HomeDomain::Switch),
    ("scene", HomeDomain::Scene),
    ("scenes", HomeDomain::Scene),
    ("script", HomeDomain::Script),
    ("scripts", HomeDomain::Script),
    ("routine", HomeDomain::Script),
    ("routines", HomeDomain::Script),
];

/// Removed from the words preceding a domain token when guessing the area.
pub const AREA_STOP_WORDS: &[&str] = &[
    "turn", "switch", "set", "the", "my", "a", "an", "to", "on", "off", "all", "every", "please",
    "and", "then", "in",
];

/// Generic words that never identify a device.
pub const DEVICE_STOP_WORDS: &[&str] = &[
    "the", "my", "a", "an", "to", "in", "of", "at", "and", "then", "please", "all", "every",
    "turn", "switch", "set", "make", "it", "them", "room", "color", "colour", "brightness",
    "percent", "with", "up", "down", "can", "you", "could", "would", "hey", "now", "bit",
];

pub const COLOR_WORDS: &[&str] = &[
    "red", "orange", "yellow", "green", "blue", "purple", "pink", "white", "cyan", "magenta",
    "teal", "violet", "indigo", "lime", "turquoise", "lavender", "gold",
];

pub const BRIGHTNESS_WORDS: &[(&str, u8)] = &[
    ("half", 50),
    ("full", 100),
    ("max", 100),
    ("maximum", 100),
    ("bright", 100),
    ("brightest", 100),
    ("dim", 25),
    ("low", 25),
    ("medium", 60),
];

pub const MATH_OPERATOR_WORDS: &[(&str, &str)] = &[
    ("multiplied by", "*"),
    ("divided by", "/"),
    ("plus", "+"),
    ("minus", "-"),
    ("times", "*"),
    ("over", "/"),
];

pub const HIGHLIGHT_INDICATORS: &[&str] =
    &["what", "what's", "how", "when", "where", "who", "why", "is", "can", "tell", "show"];

pub const HIGHLIGHT_TOOL_WORDS: &[&str] = &[
    "time",
    "weather",
    "temperature",
    "date",
    "day",
    "search",
    "calculate",
    "calculator",
    "music",
    "spotify",
    "homeassistant",
];

/// Lower-cased whitespace tokens with edge punctuation removed.
pub fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(clean_token).filter(|word| !word.is_empty()).collect()
}

pub fn lookup<T: Copy>(table: &[(&str, T)], word: &str) -> Option<T> {
    table.iter().find(|(key, _)| *key == word).map(|(_, value)| *value)
}

pub fn domain_for(word: &str) -> Option<HomeDomain> {
    lookup(HOME_DOMAIN_SYNONYMS, word)
}

pub fn is_color(word: &str) -> bool {
    COLOR_WORDS.contains(&word)
}
