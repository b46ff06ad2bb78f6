//! Contracts for the external services the tools call. HTTP implementations
//! live in the server crate; [`Offline`] stands in when nothing is configured.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use neubot_core::domain::query::{HomeAction, HomeDomain};
use neubot_core::errors::ToolError;

#[derive(Clone, Debug, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
}

impl GeoPoint {
    /// First comma-separated segment of the display name.
    pub fn short_name(&self) -> &str {
        self.display_name.split(',').next().map(str::trim).unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WeatherReport {
    pub temp_c: f64,
    pub condition: String,
    pub humidity_pct: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub description: String,
    pub favicon: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub spellcheck: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Device {
    pub entity_id: String,
    pub friendly_name: String,
    pub domain: HomeDomain,
    pub state: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ServiceModifiers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_pct: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MusicAction {
    Play,
    Pause,
    Next,
    Previous,
}

impl MusicAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Next => "next",
            Self::Previous => "previous",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NowPlaying {
    pub track: String,
    pub artist: String,
    pub is_playing: bool,
    pub device: Option<String>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, place: &str) -> Result<Option<GeoPoint>, ToolError>;
}

#[async_trait]
pub trait TimezoneLookup: Send + Sync {
    async fn timezone_for(&self, latitude: f64, longitude: f64)
        -> Result<Option<String>, ToolError>;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, latitude: f64, longitude: f64) -> Result<WeatherReport, ToolError>;
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResults, ToolError>;
}

#[async_trait]
pub trait SmartHomeBackend: Send + Sync {
    async fn list_devices(&self, domain: HomeDomain) -> Result<Vec<Device>, ToolError>;

    /// Returns the upstream status code on success.
    async fn call_service(
        &self,
        domain: HomeDomain,
        action: HomeAction,
        entity_id: &str,
        modifiers: &ServiceModifiers,
    ) -> Result<u16, ToolError>;
}

#[async_trait]
pub trait MusicPlayer: Send + Sync {
    async fn control(&self, action: MusicAction) -> Result<(), ToolError>;
    async fn now_playing(&self) -> Result<Option<NowPlaying>, ToolError>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub geocoder: Arc<dyn Geocoder>,
    pub timezones: Arc<dyn TimezoneLookup>,
    pub weather: Arc<dyn WeatherProvider>,
    pub search: Arc<dyn SearchProvider>,
    pub smart_home: Arc<dyn SmartHomeBackend>,
    pub music: Arc<dyn MusicPlayer>,
}

impl Collaborators {
    pub fn offline() -> Self {
        let offline = Arc::new(Offline);
        Self {
            geocoder: offline.clone(),
            timezones: offline.clone(),
            weather: offline.clone(),
            search: offline.clone(),
            smart_home: offline.clone(),
            music: offline,
        }
    }
}

/// Every call reports the integration as not linked.
#[derive(Clone, Copy, Debug, Default)]
pub struct Offline;

#[async_trait]
impl Geocoder for Offline {
    async fn geocode(&self, _place: &str) -> Result<Option<GeoPoint>, ToolError> {
        Err(ToolError::Unauthenticated { integration: "geocoding" })
    }
}

#[async_trait]
impl TimezoneLookup for Offline {
    async fn timezone_for(
        &self,
        _latitude: f64,
        _longitude: f64,
    ) -> Result<Option<String>, ToolError> {
        Err(ToolError::Unauthenticated { integration: "timezone lookup" })
    }
}

#[async_trait]
impl WeatherProvider for Offline {
    async fn current(&self, _latitude: f64, _longitude: f64) -> Result<WeatherReport, ToolError> {
        Err(ToolError::Unauthenticated { integration: "OpenWeather" })
    }
}

#[async_trait]
impl SearchProvider for Offline {
    async fn search(&self, _query: &str) -> Result<SearchResults, ToolError> {
        Err(ToolError::Unauthenticated { integration: "Brave Search" })
    }
}

#[async_trait]
impl SmartHomeBackend for Offline {
    async fn list_devices(&self, _domain: HomeDomain) -> Result<Vec<Device>, ToolError> {
        Err(ToolError::Unauthenticated { integration: "Home Assistant" })
    }

    async fn call_service(
        &self,
        _domain: HomeDomain,
        _action: HomeAction,
        _entity_id: &str,
        _modifiers: &ServiceModifiers,
    ) -> Result<u16, ToolError> {
        Err(ToolError::Unauthenticated { integration: "Home Assistant" })
    }
}

#[async_trait]
impl MusicPlayer for Offline {
    async fn control(&self, _action: MusicAction) -> Result<(), ToolError> {
        Err(ToolError::Unauthenticated { integration: "Spotify" })
    }

    async fn now_playing(&self) -> Result<Option<NowPlaying>, ToolError> {
        Err(ToolError::Unauthenticated { integration: "Spotify" })
    }
}

#[cfg(test)]
mod tests {
    use super::GeoPoint;

    #[test]
    fn short_name_is_first_display_segment() {
        let point = GeoPoint {
            latitude: 48.85,
            longitude: 2.35,
            display_name: "Paris, Ile-de-France, France".to_string(),
        };
        assert_eq!(point.short_name(), "Paris");
    }
}
