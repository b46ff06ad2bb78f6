use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use neubot_agent::collaborators::{
    Collaborators, Device, GeoPoint, Geocoder, SearchHit, SearchProvider, SearchResults,
    ServiceModifiers, SmartHomeBackend, TimezoneLookup, WeatherProvider, WeatherReport,
};
use neubot_agent::runtime::{NOTHING_THOUGHT, QUOTA_REFUSAL};
use neubot_agent::vocabulary::{GREETING_REPLIES, HELP_SUFFIX};
use neubot_agent::{QueryResponse, QueryRouter};
use neubot_core::clock::ManualClock;
use neubot_core::config::RoutingConfig;
use neubot_core::domain::query::{HomeAction, HomeDomain, Query};
use neubot_core::domain::quota::{Identity, QuotaLimits, QuotaStatus, QuotaTiers};
use neubot_core::errors::ToolError;
use neubot_core::quota::QuotaEngine;
use neubot_db::InMemoryQuotaStore;

type TestResult<T = ()> = Result<T, String>;

struct Atlas;

#[async_trait]
impl Geocoder for Atlas {
    async fn geocode(&self, place: &str) -> Result<Option<GeoPoint>, ToolError> {
        let point = match place {
            "Tokyo" => Some((35.68, 139.69, "東京都, 日本")),
            "Munich" => Some((48.14, 11.58, "München, Bayern, Deutschland")),
            "Paris" => Some((48.85, 2.35, "Paris, Ile-de-France, France")),
            _ => None,
        };
        Ok(point.map(|(latitude, longitude, name)| GeoPoint {
            latitude,
            longitude,
            display_name: name.to_string(),
        }))
    }
}

#[async_trait]
impl TimezoneLookup for Atlas {
    async fn timezone_for(
        &self,
        _latitude: f64,
        longitude: f64,
    ) -> Result<Option<String>, ToolError> {
        let zone = match longitude {
            east if east > 100.0 => "Asia/Tokyo",
            east if east > 10.0 => "Europe/Berlin",
            _ => "Europe/Paris",
        };
        Ok(Some(zone.to_string()))
    }
}

fn upstream(service: &'static str, status: u16) -> ToolError {
    ToolError::UpstreamFailure { service, status, message: format!("{service} returned {status}") }
}

/// Upstream failure knobs for the fakes; `None` means the call succeeds.
#[derive(Clone, Copy, Default)]
struct Failures {
    weather: Option<u16>,
    search: Option<u16>,
    device: Option<(&'static str, u16)>,
}

#[derive(Default)]
struct CountingWeather {
    calls: AtomicUsize,
    failure: Option<u16>,
}

#[async_trait]
impl WeatherProvider for CountingWeather {
    async fn current(&self, _latitude: f64, _longitude: f64) -> Result<WeatherReport, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.failure {
            return Err(upstream("weather", status));
        }
        Ok(WeatherReport { temp_c: 20.0, condition: "clear sky".to_string(), humidity_pct: 40 })
    }
}

#[derive(Default)]
struct CountingSearch {
    calls: AtomicUsize,
    failure: Option<u16>,
}

#[async_trait]
impl SearchProvider for CountingSearch {
    async fn search(&self, query: &str) -> Result<SearchResults, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.failure {
            return Err(upstream("search", status));
        }
        Ok(SearchResults {
            hits: vec![SearchHit {
                title: format!("All about {query}"),
                url: "https://example.org/".to_string(),
                description: String::new(),
                favicon: String::new(),
            }],
            spellcheck: None,
        })
    }
}

type ServiceCall = (String, HomeAction, Option<String>);

#[derive(Default)]
struct RecordingHome {
    calls: Mutex<Vec<ServiceCall>>,
    broken: Option<(&'static str, u16)>,
}

impl RecordingHome {
    fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SmartHomeBackend for RecordingHome {
    async fn list_devices(&self, domain: HomeDomain) -> Result<Vec<Device>, ToolError> {
        let device = |id: &str, name: &str| Device {
            entity_id: format!("light.{id}"),
            friendly_name: name.to_string(),
            domain,
            state: "off".to_string(),
        };
        Ok(vec![device("desk", "Desk Light"), device("bed", "Bed Lamp")])
    }

    async fn call_service(
        &self,
        _domain: HomeDomain,
        action: HomeAction,
        entity_id: &str,
        modifiers: &ServiceModifiers,
    ) -> Result<u16, ToolError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((entity_id.to_string(), action, modifiers.color.clone()));
        }
        match self.broken {
            Some((broken, status)) if broken == entity_id => {
                Err(upstream("home assistant", status))
            }
            _ => Ok(200),
        }
    }
}

struct Harness {
    router: QueryRouter,
    weather: Arc<CountingWeather>,
    search: Arc<CountingSearch>,
    home: Arc<RecordingHome>,
}

fn harness(tiers: QuotaTiers) -> TestResult<Harness> {
    harness_with(tiers, Failures::default())
}

fn harness_with(tiers: QuotaTiers, failures: Failures) -> TestResult<Harness> {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().ok_or("bad start date")?;
    let clock = Arc::new(ManualClock::new(start));
    let weather = Arc::new(CountingWeather { failure: failures.weather, ..Default::default() });
    let search = Arc::new(CountingSearch { failure: failures.search, ..Default::default() });
    let home = Arc::new(RecordingHome { broken: failures.device, ..Default::default() });

    let collaborators = Collaborators {
        geocoder: Arc::new(Atlas),
        timezones: Arc::new(Atlas),
        weather: weather.clone(),
        search: search.clone(),
        smart_home: home.clone(),
        ..Collaborators::offline()
    };
    let quota = QuotaEngine::new(Arc::new(InMemoryQuotaStore::default()), tiers, clock.clone());
    let routing = RoutingConfig { rng_seed: Some(11), ..RoutingConfig::default() };
    let router = QueryRouter::new(collaborators, quota, clock, routing, "America/New_York");

    Ok(Harness { router, weather, search, home })
}

fn guest() -> Identity {
    Identity::Address("198.51.100.4".to_string())
}

async fn ask(harness: &Harness, text: &str) -> TestResult<QueryResponse> {
    harness
        .router
        .handle(&Query::with_default_timezone(text), &guest())
        .await
        .map_err(|e| e.to_string())
}

async fn usage(harness: &Harness) -> TestResult<QuotaStatus> {
    harness.router.quota().status(&guest()).await.map_err(|e| e.to_string())
}

async fn total_used(harness: &Harness) -> TestResult<u32> {
    Ok(usage(harness).await?.total.used)
}

fn has_step(reply: &QueryResponse, description: &str) -> bool {
    reply.thoughts.iter().any(|step| step.description == description)
}

#[tokio::test]
async fn time_in_a_named_city_uses_its_zone() -> TestResult {
    let harness = harness(QuotaTiers::default())?;
    let reply = ask(&harness, "what is the time in Tokyo").await?;

    assert_eq!(
        reply.response,
        "The current time in Tokyo is 09:00 PM JST (Asia/Tokyo, UTC+09:00)."
    );
    assert_eq!(reply.location.as_deref(), Some("Tokyo"));
    assert!(reply.highlighted_query.contains(r#"<span class="attribute">Tokyo</span>"#));
    assert_eq!(reply.thoughts[0].description, "Received query");
    assert_eq!(total_used(&harness).await?, 1);
    Ok(())
}

#[tokio::test]
async fn arithmetic_is_evaluated() -> TestResult {
    let harness = harness(QuotaTiers::default())?;
    let reply = ask(&harness, "5 + 3").await?;

    assert_eq!(reply.response, "5 + 3 = 8");
    assert!(reply
        .thoughts
        .iter()
        .any(|step| step.description == "Sanitized math expression" && step.result_text() == "5 + 3"));
    Ok(())
}

#[tokio::test]
async fn greetings_are_answered_without_tools_or_quota() -> TestResult {
    let harness = harness(QuotaTiers::default())?;
    let reply = ask(&harness, "Hello!").await?;

    assert!(reply.response.ends_with(HELP_SUFFIX));
    assert!(GREETING_REPLIES.iter().any(|greeting| reply.response.starts_with(greeting)));
    assert!(reply.thoughts.iter().all(|step| !step.description.starts_with("Executing")));
    assert_eq!(total_used(&harness).await?, 0);
    Ok(())
}

#[tokio::test]
async fn disable_phrase_short_circuits_everything() -> TestResult {
    let harness = harness(QuotaTiers::default())?;
    let reply = ask(&harness, "hello, disable thinking!").await?;

    assert_eq!(reply.response, NOTHING_THOUGHT);
    assert!(reply.thoughts.is_empty());
    assert_eq!(reply.highlighted_query, "hello, disable thinking!");
    assert_eq!(total_used(&harness).await?, 0);
    Ok(())
}

#[tokio::test]
async fn weather_refusal_skips_the_provider_and_the_total_counter() -> TestResult {
    let tiers = QuotaTiers {
        guest: QuotaLimits { search: 5, weather: 1, total: 50 },
        authenticated: QuotaLimits { search: 10, weather: 2, total: 100 },
    };
    let harness = harness(tiers)?;

    let first = ask(&harness, "weather in Paris").await?;
    assert_eq!(
        first.response,
        "The weather in Paris is clear sky with a temperature of 20.0°C/68.0°F and 40% humidity."
    );
    assert_eq!(total_used(&harness).await?, 1);

    let second = ask(&harness, "weather in Paris").await?;
    assert_eq!(
        second.response,
        "Sorry, I can't get weather information because you've exceeded your monthly limit."
    );
    assert_eq!(harness.weather.calls.load(Ordering::SeqCst), 1);
    assert_eq!(total_used(&harness).await?, 1);
    Ok(())
}

#[tokio::test]
async fn exhausted_total_quota_returns_the_apology() -> TestResult {
    let tiers = QuotaTiers {
        guest: QuotaLimits { search: 5, weather: 5, total: 1 },
        authenticated: QuotaLimits { search: 10, weather: 10, total: 2 },
    };
    let harness = harness(tiers)?;

    ask(&harness, "5 + 3").await?;
    let refused = ask(&harness, "what is 2 + 2").await?;

    assert_eq!(refused.response, QUOTA_REFUSAL);
    assert!(refused.thoughts.is_empty());
    assert_eq!(refused.highlighted_query, "what is 2 + 2");
    Ok(())
}

#[tokio::test]
async fn compound_light_command_calls_each_device() -> TestResult {
    let harness = harness(QuotaTiers::default())?;
    let reply = ask(&harness, "turn on the desk light and set the bed lamp to blue").await?;

    assert_eq!(
        harness.home.calls(),
        [
            ("light.desk".to_string(), HomeAction::TurnOn, None),
            ("light.bed".to_string(), HomeAction::TurnOn, Some("blue".to_string())),
        ]
    );

    let payload: serde_json::Value =
        serde_json::from_str(&reply.response).map_err(|e| e.to_string())?;
    assert_eq!(
        payload["summary"],
        "Okay, I turned on Desk Light and turned on Bed Lamp in blue."
    );
    assert_eq!(payload["results"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn time_reply_names_the_place_that_was_asked_for() -> TestResult {
    let harness = harness(QuotaTiers::default())?;
    let reply = ask(&harness, "what time is it in Munich").await?;

    assert_eq!(
        reply.response,
        "The current time in Munich is 01:00 PM CET (Europe/Berlin, UTC+01:00)."
    );
    assert!(!reply.response.contains("München"));
    Ok(())
}

#[tokio::test]
async fn deeply_nested_arithmetic_is_rejected_without_crashing() -> TestResult {
    let harness = harness(QuotaTiers::default())?;
    let reply = ask(&harness, &format!("{}5 + 3", "(".repeat(20_000))).await?;

    assert_eq!(
        reply.response,
        "I couldn't calculate that. Please check the syntax of your expression."
    );
    assert!(has_step(&reply, "Tool error"));
    Ok(())
}

#[tokio::test]
async fn weather_upstream_failure_is_reported_and_not_charged_as_weather() -> TestResult {
    let failures = Failures { weather: Some(503), ..Failures::default() };
    let harness = harness_with(QuotaTiers::default(), failures)?;
    let reply = ask(&harness, "weather in Paris").await?;

    assert_eq!(
        reply.response,
        "Sorry, I couldn't retrieve the weather information for Paris right now."
    );
    assert!(has_step(&reply, "Tool error"));
    assert_eq!(harness.weather.calls.load(Ordering::SeqCst), 1);

    let status = usage(&harness).await?;
    assert_eq!(status.weather.used, 0);
    assert_eq!(status.total.used, 1, "the accepted query itself still counts once");
    Ok(())
}

#[tokio::test]
async fn search_refusal_returns_the_error_payload_and_charges_nothing() -> TestResult {
    let tiers = QuotaTiers {
        guest: QuotaLimits { search: 0, weather: 5, total: 50 },
        authenticated: QuotaLimits { search: 10, weather: 10, total: 100 },
    };
    let harness = harness(tiers)?;
    let reply = ask(&harness, "search for rust lifetimes").await?;

    let payload: serde_json::Value =
        serde_json::from_str(&reply.response).map_err(|e| e.to_string())?;
    assert_eq!(payload["type"], "search_results");
    assert_eq!(
        payload["error"],
        "Sorry, I can't search the web because you've exceeded your monthly limit."
    );
    assert_eq!(harness.search.calls.load(Ordering::SeqCst), 0);
    assert_eq!(total_used(&harness).await?, 0);
    Ok(())
}

#[tokio::test]
async fn search_upstream_failure_returns_a_failed_search_payload() -> TestResult {
    let failures = Failures { search: Some(502), ..Failures::default() };
    let harness = harness_with(QuotaTiers::default(), failures)?;
    let reply = ask(&harness, "search for rust lifetimes").await?;

    let payload: serde_json::Value =
        serde_json::from_str(&reply.response).map_err(|e| e.to_string())?;
    assert_eq!(payload["error"], "Failed to perform search");

    let status = usage(&harness).await?;
    assert_eq!(status.search.used, 0);
    assert_eq!(status.total.used, 1);
    Ok(())
}

#[tokio::test]
async fn search_success_is_charged_once_as_search_and_total() -> TestResult {
    let harness = harness(QuotaTiers::default())?;
    let reply = ask(&harness, "search for rust lifetimes").await?;

    let payload: serde_json::Value =
        serde_json::from_str(&reply.response).map_err(|e| e.to_string())?;
    assert_eq!(payload["query"], "rust lifetimes");
    assert_eq!(payload["results"][0]["title"], "All about rust lifetimes");

    let status = usage(&harness).await?;
    assert_eq!(status.search.used, 1);
    assert_eq!(status.total.used, 1);
    Ok(())
}

#[tokio::test]
async fn failing_device_does_not_block_the_others() -> TestResult {
    let failures = Failures { device: Some(("light.desk", 500)), ..Failures::default() };
    let harness = harness_with(QuotaTiers::default(), failures)?;
    let reply = ask(&harness, "turn on the desk light and set the bed lamp to blue").await?;

    assert_eq!(harness.home.calls().len(), 2);

    let payload: serde_json::Value =
        serde_json::from_str(&reply.response).map_err(|e| e.to_string())?;
    assert_eq!(
        payload["summary"],
        "Okay, I turned on Bed Lamp in blue. I couldn't update Desk Light."
    );
    let results = payload["results"].as_array().cloned().unwrap_or_default();
    let desk = results.iter().find(|result| result["entity_id"] == "light.desk");
    let bed = results.iter().find(|result| result["entity_id"] == "light.bed");
    assert_eq!(desk.map(|result| result["success"].clone()), Some(false.into()));
    assert_eq!(desk.map(|result| result["status_code"].clone()), Some(500.into()));
    assert_eq!(bed.map(|result| result["success"].clone()), Some(true.into()));
    Ok(())
}

#[tokio::test]
async fn one_failing_tool_keeps_the_other_replies() -> TestResult {
    let failures = Failures { weather: Some(500), ..Failures::default() };
    let harness = harness_with(QuotaTiers::default(), failures)?;
    let reply = ask(&harness, "what time and weather in Paris").await?;

    assert_eq!(
        reply.response,
        "The current time in Paris is 01:00 PM CET (Europe/Paris, UTC+01:00). \
         Sorry, I couldn't retrieve the weather information for Paris right now."
    );
    assert!(has_step(&reply, "Tool error"));
    Ok(())
}
