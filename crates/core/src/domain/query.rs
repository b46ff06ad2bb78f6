use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Characters stripped from both ends of a token before keyword comparison.
pub const TOKEN_PUNCTUATION: &[char] = &['.', ',', '?', '!', ';', ':'];

/// One incoming utterance plus the caller's timezone hint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    text: String,
    timezone: String,
}

impl Query {
    pub fn new(text: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self { text: text.into(), timezone: timezone.into() }
    }

    pub fn with_default_timezone(text: impl Into<String>) -> Self {
        Self::new(text, DEFAULT_TIMEZONE)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    pub fn tokens(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }
}

pub fn clean_token(token: &str) -> String {
    token.trim_matches(TOKEN_PUNCTUATION).to_lowercase()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThoughtStep {
    pub description: String,
    pub result: Value,
}

impl ThoughtStep {
    /// Text rendering used on the wire: strings verbatim, null as `None`,
    /// everything else as compact JSON.
    pub fn result_text(&self) -> String {
        match &self.result {
            Value::Null => "None".to_string(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSpec {
    Today,
    Tomorrow,
}

impl DateSpec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Tomorrow => "tomorrow",
        }
    }

    pub fn days_ahead(&self) -> i64 {
        match self {
            Self::Today => 0,
            Self::Tomorrow => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeAction {
    TurnOn,
    TurnOff,
}

impl HomeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TurnOn => "turn_on",
            Self::TurnOff => "turn_off",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::TurnOn => "turned on",
            Self::TurnOff => "turned off",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeDomain {
    Light,
    Fan,
    Switch,
    Scene,
    Script,
}

impl HomeDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Fan => "fan",
            Self::Switch => "switch",
            Self::Scene => "scene",
            Self::Script => "script",
        }
    }

    /// Scenes and scripts are only ever activated.
    pub fn activation_only(&self) -> bool {
        matches!(self, Self::Scene | Self::Script)
    }
}

/// Entities pulled out of one query. Absence means "not detected".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EntityBag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub math_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ha_action: Option<HomeAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ha_domain: Option<HomeDomain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ha_area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ha_device_phrase: Option<String>,
}

impl EntityBag {
    pub fn timezone_or_default(&self) -> &str {
        self.user_timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{clean_token, EntityBag, Query, ThoughtStep, DEFAULT_TIMEZONE};

    #[test]
    fn tokens_split_on_whitespace_and_clean_strips_punctuation() {
        let query = Query::with_default_timezone("What time is it in Tokyo?");
        let tokens = query.tokens();

        assert_eq!(tokens.len(), 6);
        assert_eq!(clean_token(tokens[5]), "tokyo");
        assert_eq!(clean_token("Weather,"), "weather");
        assert_eq!(query.timezone(), DEFAULT_TIMEZONE);
    }

    #[test]
    fn thought_results_render_as_text() {
        let null = ThoughtStep { description: "none".to_string(), result: json!(null) };
        let text = ThoughtStep { description: "text".to_string(), result: json!("Tokyo") };
        let list = ThoughtStep { description: "list".to_string(), result: json!(["time"]) };

        assert_eq!(null.result_text(), "None");
        assert_eq!(text.result_text(), "Tokyo");
        assert_eq!(list.result_text(), "[\"time\"]");
    }

    #[test]
    fn empty_entity_bag_serializes_without_keys() {
        let bag = EntityBag::default();
        assert_eq!(serde_json::to_value(&bag).expect("serialize"), json!({}));
        assert_eq!(bag.timezone_or_default(), DEFAULT_TIMEZONE);
    }
}
