//! reqwest implementations of the collaborator contracts.
//!
//! Each client returns `Unauthenticated` when its credentials are missing and
//! `UpstreamFailure` with the status code on any non-2xx reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use neubot_agent::collaborators::{
    Collaborators, Device, GeoPoint, Geocoder, MusicAction, MusicPlayer, NowPlaying, SearchHit,
    SearchProvider, SearchResults, ServiceModifiers, SmartHomeBackend, TimezoneLookup,
    WeatherProvider, WeatherReport,
};
use neubot_core::config::IntegrationsConfig;
use neubot_core::domain::query::{HomeAction, HomeDomain};
use neubot_core::errors::ToolError;

const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const SPOTIFY_PLAYER_URL: &str = "https://api.spotify.com/v1/me/player";

pub fn build(config: &IntegrationsConfig) -> Result<Collaborators, reqwest::Error> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .user_agent(concat!("neubot/", env!("CARGO_PKG_VERSION")))
        .build()?;

    Ok(Collaborators {
        geocoder: Arc::new(Nominatim {
            client: client.clone(),
            base_url: trim_base(&config.geocoder_url),
        }),
        timezones: Arc::new(OpenMeteo {
            client: client.clone(),
            base_url: trim_base(&config.timezone_url),
        }),
        weather: Arc::new(OpenWeather {
            client: client.clone(),
            api_key: config.openweather_api_key.clone(),
        }),
        search: Arc::new(BraveSearch {
            client: client.clone(),
            token: config.brave_search_token.clone(),
        }),
        smart_home: Arc::new(HomeAssistant {
            client: client.clone(),
            base_url: config.home_assistant_url.as_deref().map(trim_base),
            token: config.home_assistant_token.clone(),
        }),
        music: Arc::new(Spotify { client, token: config.spotify_access_token.clone() }),
    })
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn transport_failure(service: &'static str, error: reqwest::Error) -> ToolError {
    warn!(event_name = "integration.transport_failed", service, error = %error, "request failed");
    ToolError::Internal(format!("{service} request failed: {error}"))
}

async fn send(service: &'static str, request: RequestBuilder) -> Result<Response, ToolError> {
    let response = request.send().await.map_err(|error| transport_failure(service, error))?;
    let status = response.status();
    if !status.is_success() {
        warn!(
            event_name = "integration.upstream_status",
            service,
            status = status.as_u16(),
            "upstream returned an error status"
        );
        return Err(ToolError::UpstreamFailure {
            service,
            status: status.as_u16(),
            message: format!("Sorry, {service} is not responding right now."),
        });
    }
    Ok(response)
}

async fn decode<T: for<'de> Deserialize<'de>>(
    service: &'static str,
    response: Response,
) -> Result<T, ToolError> {
    response.json::<T>().await.map_err(|error| transport_failure(service, error))
}

fn secret<'a>(
    value: &'a Option<SecretString>,
    integration: &'static str,
) -> Result<&'a str, ToolError> {
    value
        .as_ref()
        .map(|secret| secret.expose_secret())
        .filter(|secret| !secret.trim().is_empty())
        .ok_or(ToolError::Unauthenticated { integration })
}

struct Nominatim {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

#[async_trait]
impl Geocoder for Nominatim {
    async fn geocode(&self, place: &str) -> Result<Option<GeoPoint>, ToolError> {
        let request = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", place),
                ("format", "json"),
                ("limit", "1"),
                ("accept-language", "en"),
            ]);
        let places: Vec<NominatimPlace> = decode("geocoding", send("geocoding", request).await?).await?;

        Ok(places.into_iter().next().and_then(|found| {
            Some(GeoPoint {
                latitude: found.lat.parse().ok()?,
                longitude: found.lon.parse().ok()?,
                display_name: found.display_name,
            })
        }))
    }
}

struct OpenMeteo {
    client: Client,
    base_url: String,
}

#[async_trait]
impl TimezoneLookup for OpenMeteo {
    async fn timezone_for(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<String>, ToolError> {
        let request = self.client.get(format!("{}/v1/forecast", self.base_url)).query(&[
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("timezone", "auto".to_string()),
        ]);
        let payload: Value = decode("timezone lookup", send("timezone lookup", request).await?).await?;
        Ok(payload
            .get("timezone")
            .and_then(Value::as_str)
            .filter(|zone| !zone.is_empty() && *zone != "GMT")
            .map(str::to_string))
    }
}

struct OpenWeather {
    client: Client,
    api_key: Option<SecretString>,
}

#[derive(Deserialize)]
struct OpenWeatherReply {
    main: OpenWeatherMain,
    #[serde(default)]
    weather: Vec<OpenWeatherCondition>,
}

#[derive(Deserialize)]
struct OpenWeatherMain {
    temp: f64,
    humidity: u32,
}

#[derive(Deserialize)]
struct OpenWeatherCondition {
    description: String,
}

#[async_trait]
impl WeatherProvider for OpenWeather {
    async fn current(&self, latitude: f64, longitude: f64) -> Result<WeatherReport, ToolError> {
        let key = secret(&self.api_key, "OpenWeather")?;
        let request = self.client.get(OPENWEATHER_URL).query(&[
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("appid", key.to_string()),
            ("units", "metric".to_string()),
        ]);
        let reply: OpenWeatherReply = decode("OpenWeather", send("OpenWeather", request).await?).await?;

        Ok(WeatherReport {
            temp_c: reply.main.temp,
            condition: reply
                .weather
                .into_iter()
                .next()
                .map(|condition| condition.description)
                .unwrap_or_else(|| "unknown conditions".to_string()),
            humidity_pct: reply.main.humidity,
        })
    }
}

struct BraveSearch {
    client: Client,
    token: Option<SecretString>,
}

fn text_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

#[async_trait]
impl SearchProvider for BraveSearch {
    async fn search(&self, query: &str) -> Result<SearchResults, ToolError> {
        let token = secret(&self.token, "Brave Search")?;
        let request = self
            .client
            .get(BRAVE_SEARCH_URL)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", token)
            .query(&[("q", query), ("count", "5"), ("spellcheck", "true")]);
        let payload: Value = decode("Brave Search", send("Brave Search", request).await?).await?;

        let hits = payload
            .pointer("/web/results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .map(|result| SearchHit {
                        title: text_field(result, "title"),
                        url: text_field(result, "url"),
                        description: text_field(result, "description"),
                        favicon: result
                            .pointer("/meta_url/favicon")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| text_field(result, "favicon")),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(SearchResults { hits, spellcheck: payload.get("spellcheck").cloned() })
    }
}

struct HomeAssistant {
    client: Client,
    base_url: Option<String>,
    token: Option<SecretString>,
}

impl HomeAssistant {
    fn endpoint(&self, path: &str) -> Result<(String, &str), ToolError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(ToolError::Unauthenticated { integration: "Home Assistant" })?;
        let token = secret(&self.token, "Home Assistant")?;
        Ok((format!("{base}/{path}"), token))
    }
}

#[derive(Deserialize)]
struct EntityState {
    entity_id: String,
    state: String,
    #[serde(default)]
    attributes: Value,
}

#[async_trait]
impl SmartHomeBackend for HomeAssistant {
    async fn list_devices(&self, domain: HomeDomain) -> Result<Vec<Device>, ToolError> {
        let (url, token) = self.endpoint("api/states")?;
        let request = self.client.get(url).bearer_auth(token);
        let states: Vec<EntityState> =
            decode("Home Assistant", send("Home Assistant", request).await?).await?;

        let prefix = format!("{}.", domain.as_str());
        Ok(states
            .into_iter()
            .filter(|entity| entity.entity_id.starts_with(&prefix))
            .map(|entity| Device {
                friendly_name: entity
                    .attributes
                    .get("friendly_name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| entity.entity_id.clone()),
                entity_id: entity.entity_id,
                domain,
                state: entity.state,
            })
            .collect())
    }

    async fn call_service(
        &self,
        domain: HomeDomain,
        action: HomeAction,
        entity_id: &str,
        modifiers: &ServiceModifiers,
    ) -> Result<u16, ToolError> {
        let (url, token) =
            self.endpoint(&format!("api/services/{}/{}", domain.as_str(), action.as_str()))?;

        let mut body = json!({ "entity_id": entity_id });
        if let Some(color) = &modifiers.color {
            body["color_name"] = json!(color);
        }
        if let Some(brightness) = modifiers.brightness_pct {
            body["brightness_pct"] = json!(brightness);
        }

        let request = self.client.post(url).bearer_auth(token).json(&body);
        let response = send("Home Assistant", request).await?;
        Ok(response.status().as_u16())
    }
}

struct Spotify {
    client: Client,
    token: Option<SecretString>,
}

#[async_trait]
impl MusicPlayer for Spotify {
    async fn control(&self, action: MusicAction) -> Result<(), ToolError> {
        let token = secret(&self.token, "Spotify")?;
        let url = format!("{SPOTIFY_PLAYER_URL}/{}", action.as_str());
        let request = match action {
            MusicAction::Play | MusicAction::Pause => self.client.put(url),
            MusicAction::Next | MusicAction::Previous => self.client.post(url),
        };
        send("Spotify", request.bearer_auth(token).header("Content-Length", "0")).await?;
        Ok(())
    }

    async fn now_playing(&self) -> Result<Option<NowPlaying>, ToolError> {
        let token = secret(&self.token, "Spotify")?;
        let response = send("Spotify", self.client.get(SPOTIFY_PLAYER_URL).bearer_auth(token)).await?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let payload: Value = decode("Spotify", response).await?;
        let Some(item) = payload.get("item").filter(|item| !item.is_null()) else {
            return Ok(None);
        };
        let artist = item
            .get("artists")
            .and_then(Value::as_array)
            .map(|artists| {
                artists
                    .iter()
                    .filter_map(|artist| artist.get("name").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();

        Ok(Some(NowPlaying {
            track: text_field(item, "name"),
            artist,
            is_playing: payload.get("is_playing").and_then(Value::as_bool).unwrap_or(false),
            device: payload.pointer("/device/name").and_then(Value::as_str).map(str::to_string),
        }))
    }
}
