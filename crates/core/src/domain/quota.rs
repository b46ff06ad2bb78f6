use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who a request is charged to: an authenticated user id, or a network
/// address for guests.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    User(String),
    Address(String),
}

impl Identity {
    pub fn resolve(user_id: Option<&str>, address: &str) -> Self {
        match user_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Self::User(id.to_string()),
            None => Self::Address(address.to_string()),
        }
    }

    /// Stable storage key; prefixes keep user ids and addresses disjoint.
    pub fn key(&self) -> String {
        match self {
            Self::User(id) => format!("user:{id}"),
            Self::Address(address) => format!("ip:{address}"),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaCategory {
    Search,
    Weather,
    Total,
}

impl QuotaCategory {
    pub const ALL: [QuotaCategory; 3] = [Self::Search, Self::Weather, Self::Total];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Weather => "weather",
            Self::Total => "total",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "search" => Some(Self::Search),
            "weather" => Some(Self::Weather),
            "total" => Some(Self::Total),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub search: u32,
    pub weather: u32,
    pub total: u32,
}

impl QuotaLimits {
    pub fn limit_for(&self, category: QuotaCategory) -> u32 {
        match category {
            QuotaCategory::Search => self.search,
            QuotaCategory::Weather => self.weather,
            QuotaCategory::Total => self.total,
        }
    }
}

/// Guest and authenticated limit sets. Selection is by identity kind only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaTiers {
    pub guest: QuotaLimits,
    pub authenticated: QuotaLimits,
}

impl Default for QuotaTiers {
    fn default() -> Self {
        Self {
            guest: QuotaLimits { search: 50, weather: 30, total: 500 },
            authenticated: QuotaLimits { search: 200, weather: 100, total: 2000 },
        }
    }
}

impl QuotaTiers {
    pub fn for_identity(&self, identity: &Identity) -> &QuotaLimits {
        if identity.is_authenticated() {
            &self.authenticated
        } else {
            &self.guest
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryUsage {
    pub limit: u32,
    pub used: u32,
    pub remaining: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResetInfo {
    pub timestamp: i64,
    pub days_remaining: i64,
    pub date: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub search: CategoryUsage,
    pub weather: CategoryUsage,
    pub total: CategoryUsage,
    pub reset: ResetInfo,
}

impl QuotaStatus {
    pub fn usage(&self, category: QuotaCategory) -> &CategoryUsage {
        match category {
            QuotaCategory::Search => &self.search,
            QuotaCategory::Weather => &self.weather,
            QuotaCategory::Total => &self.total,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotaRecord {
    pub identity: String,
    pub category: QuotaCategory,
    pub recorded_at: DateTime<Utc>,
}
