use std::collections::BTreeSet;

use serde::Serialize;

/// The fixed set of capabilities a query can be routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Time,
    Weather,
    Date,
    Day,
    Calculator,
    HomeAssistant,
    Music,
    Search,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Weather => "weather",
            Self::Date => "date",
            Self::Day => "day",
            Self::Calculator => "calculator",
            Self::HomeAssistant => "homeassistant",
            Self::Music => "music",
            Self::Search => "search",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type ToolSet = BTreeSet<ToolKind>;

pub fn tool_names(tools: &ToolSet) -> Vec<&'static str> {
    tools.iter().map(ToolKind::as_str).collect()
}
