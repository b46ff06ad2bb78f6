//! Tool invocations and their execution.
//!
//! Each [`ToolInvocation`] variant carries exactly the arguments its tool
//! reads. Tools report failure through [`ToolError`]; the router turns those
//! into reply text.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use serde_json::{json, Value};
use tracing::{debug, warn};

use neubot_core::clock::Clock;
use neubot_core::config::RoutingConfig;
use neubot_core::domain::query::{DateSpec, EntityBag, HomeAction, HomeDomain, DEFAULT_TIMEZONE};
use neubot_core::domain::quota::{Identity, QuotaCategory};
use neubot_core::domain::tool::ToolKind;
use neubot_core::errors::{ApplicationError, ToolError};
use neubot_core::quota::QuotaEngine;

use crate::collaborators::{Collaborators, MusicAction};
use crate::home::{self, PlanRequest};
use crate::math;
use crate::trace::TraceRecorder;
use crate::vocabulary;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolInvocation {
    Time { location: Option<String>, timezone: String },
    Weather { location: Option<String> },
    Date { date: DateSpec, timezone: String },
    Day { date: DateSpec, timezone: String },
    Calculator { expression: String },
    HomeAssistant {
        text: String,
        action: Option<HomeAction>,
        domain: Option<HomeDomain>,
        area: Option<String>,
        device_phrase: Option<String>,
    },
    Music { text: String },
    Search { query: Option<String> },
}

impl ToolInvocation {
    /// Binds a selected tool to its arguments. Only the calculator refuses to
    /// build without one, since it has nothing to evaluate.
    pub fn build(kind: ToolKind, text: &str, entities: &EntityBag) -> Option<Self> {
        let timezone = entities.timezone_or_default().to_string();
        let date = entities.date.unwrap_or(DateSpec::Today);

        let invocation = match kind {
            ToolKind::Time => Self::Time { location: entities.location.clone(), timezone },
            ToolKind::Weather => Self::Weather { location: entities.location.clone() },
            ToolKind::Date => Self::Date { date, timezone },
            ToolKind::Day => Self::Day { date, timezone },
            ToolKind::Calculator => {
                Self::Calculator { expression: entities.math_expression.clone()? }
            }
            ToolKind::HomeAssistant => Self::HomeAssistant {
                text: text.to_string(),
                action: entities.ha_action,
                domain: entities.ha_domain,
                area: entities.ha_area.clone(),
                device_phrase: entities.ha_device_phrase.clone(),
            },
            ToolKind::Music => Self::Music { text: text.to_string() },
            ToolKind::Search => Self::Search { query: entities.search_query.clone() },
        };
        Some(invocation)
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::Time { .. } => ToolKind::Time,
            Self::Weather { .. } => ToolKind::Weather,
            Self::Date { .. } => ToolKind::Date,
            Self::Day { .. } => ToolKind::Day,
            Self::Calculator { .. } => ToolKind::Calculator,
            Self::HomeAssistant { .. } => ToolKind::HomeAssistant,
            Self::Music { .. } => ToolKind::Music,
            Self::Search { .. } => ToolKind::Search,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => value.to_string(),
        }
    }
}

/// What a tool did to the caller's quota.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Charge {
    Unmetered,
    Recorded(QuotaCategory),
    Refused(QuotaCategory),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolReply {
    pub output: ToolOutput,
    pub charge: Charge,
}

impl ToolReply {
    fn text(text: impl Into<String>) -> Self {
        Self { output: ToolOutput::Text(text.into()), charge: Charge::Unmetered }
    }
}

/// Shared services a tool may reach for while running.
pub struct ToolContext<'a> {
    pub collaborators: &'a Collaborators,
    pub quota: &'a QuotaEngine,
    pub identity: &'a Identity,
    pub clock: &'a dyn Clock,
    pub routing: &'a RoutingConfig,
    pub rng: &'a Mutex<StdRng>,
}

pub async fn run(
    invocation: &ToolInvocation,
    ctx: &ToolContext<'_>,
    trace: &mut TraceRecorder,
) -> Result<ToolReply, ToolError> {
    debug!(event_name = "tool.invoke", tool = invocation.kind().as_str(), "running tool");

    match invocation {
        ToolInvocation::Time { location, timezone } => {
            current_time(ctx, location.as_deref(), timezone, trace).await.map(ToolReply::text)
        }
        ToolInvocation::Weather { location } => weather(ctx, location.as_deref(), trace).await,
        ToolInvocation::Date { date, timezone } => {
            trace.record("Executing date tool", date.as_str());
            let local = shifted(ctx.clock.now(), *date).with_timezone(&zone_or_default(timezone));
            let day = match date {
                DateSpec::Today => "Today's",
                DateSpec::Tomorrow => "Tomorrow's",
            };
            Ok(ToolReply::text(format!("{day} date is {}.", local.format("%A, %B %d, %Y"))))
        }
        ToolInvocation::Day { date, timezone } => {
            trace.record("Executing day tool", date.as_str());
            let local = shifted(ctx.clock.now(), *date).with_timezone(&zone_or_default(timezone));
            let day = match date {
                DateSpec::Today => "Today",
                DateSpec::Tomorrow => "Tomorrow",
            };
            Ok(ToolReply::text(format!("{day} is {}.", local.format("%A"))))
        }
        ToolInvocation::Calculator { expression } => {
            trace.record("Executing calculator tool", expression);
            let value = math::evaluate(expression)?;
            Ok(ToolReply::text(format!("{expression} = {}", math::format_number(value))))
        }
        ToolInvocation::HomeAssistant { text, action, domain, area, device_phrase } => {
            let request = HomeRequest {
                text,
                action: *action,
                domain: *domain,
                area: area.as_deref(),
                device_phrase: device_phrase.as_deref(),
            };
            smart_home(ctx, request, trace).await
        }
        ToolInvocation::Music { text } => music(ctx, text, trace).await.map(ToolReply::text),
        ToolInvocation::Search { query } => search(ctx, query.as_deref(), trace).await,
    }
}

fn shifted(now: DateTime<Utc>, date: DateSpec) -> DateTime<Utc> {
    now + Duration::days(date.days_ahead())
}

/// Parses an IANA zone id, falling back to the service default.
pub fn zone_or_default(timezone: &str) -> Tz {
    timezone
        .parse::<Tz>()
        .or_else(|_| DEFAULT_TIMEZONE.parse::<Tz>())
        .unwrap_or(Tz::UTC)
}

fn quota_failure(error: ApplicationError) -> ToolError {
    ToolError::Internal(error.to_string())
}

fn location_not_found(place: &str) -> ToolError {
    ToolError::NotFound {
        subject: place.to_string(),
        message: format!(
            "I couldn't find the location '{place}'. Please check the spelling or try a different location."
        ),
    }
}

async fn current_time(
    ctx: &ToolContext<'_>,
    location: Option<&str>,
    timezone: &str,
    trace: &mut TraceRecorder,
) -> Result<String, ToolError> {
    trace.record("Executing time tool", json!({"location": location, "user_timezone": timezone}));
    let now = ctx.clock.now();

    let Some(place) = location else {
        let zone = zone_or_default(timezone);
        let local = now.with_timezone(&zone);
        return Ok(format!(
            "The current time is {} ({}, UTC{}).",
            local.format("%I:%M %p %Z"),
            zone.name(),
            local.format("%:z")
        ));
    };

    let point = ctx
        .collaborators
        .geocoder
        .geocode(place)
        .await?
        .ok_or_else(|| location_not_found(place))?;
    trace.record(
        "Geocoded location",
        json!({"name": point.display_name, "lat": point.latitude, "lon": point.longitude}),
    );

    let unresolved = || ToolError::NotFound {
        subject: place.to_string(),
        message: format!("I found {place}, but couldn't determine its timezone."),
    };
    let zone_id = ctx
        .collaborators
        .timezones
        .timezone_for(point.latitude, point.longitude)
        .await?
        .ok_or_else(unresolved)?;
    let zone: Tz = zone_id.parse().map_err(|_| unresolved())?;
    trace.record("Resolved timezone", &zone_id);

    let local = now.with_timezone(&zone);
    Ok(format!(
        "The current time in {place} is {} ({zone_id}, UTC{}).",
        local.format("%I:%M %p %Z"),
        local.format("%:z")
    ))
}

async fn weather(
    ctx: &ToolContext<'_>,
    location: Option<&str>,
    trace: &mut TraceRecorder,
) -> Result<ToolReply, ToolError> {
    trace.record("Executing weather tool", json!({"location": location}));
    let Some(place) = location else {
        return Ok(ToolReply::text(
            "I need a location to check the weather. Please specify a city or place.",
        ));
    };

    let decision =
        ctx.quota.check(ctx.identity, QuotaCategory::Weather).await.map_err(quota_failure)?;
    if !decision.allowed {
        return Err(ToolError::QuotaExceeded {
            category: QuotaCategory::Weather.as_str(),
            message: "Sorry, I can't get weather information because you've exceeded your monthly limit."
                .to_string(),
        });
    }

    let point = ctx
        .collaborators
        .geocoder
        .geocode(place)
        .await?
        .ok_or_else(|| location_not_found(place))?;
    let name = point.short_name().to_string();
    trace.record("Geocoded location", json!({"lat": point.latitude, "lon": point.longitude}));

    let report = match ctx.collaborators.weather.current(point.latitude, point.longitude).await {
        Ok(report) => report,
        Err(ToolError::UpstreamFailure { service, status, .. }) => {
            trace.record("Weather service error", json!({"status": status}));
            return Err(ToolError::UpstreamFailure {
                service,
                status,
                message: format!(
                    "Sorry, I couldn't retrieve the weather information for {name} right now."
                ),
            });
        }
        Err(other) => return Err(other),
    };

    let temp_f = report.temp_c * 9.0 / 5.0 + 32.0;
    trace.record(
        "Weather data retrieved",
        json!({"temp_c": report.temp_c, "temp_f": temp_f, "condition": report.condition}),
    );
    ctx.quota.record(ctx.identity, QuotaCategory::Weather).await.map_err(quota_failure)?;

    Ok(ToolReply {
        output: ToolOutput::Text(format!(
            "The weather in {name} is {} with a temperature of {:.1}°C/{:.1}°F and {}% humidity.",
            report.condition, report.temp_c, temp_f, report.humidity_pct
        )),
        charge: Charge::Recorded(QuotaCategory::Weather),
    })
}

async fn search(
    ctx: &ToolContext<'_>,
    query: Option<&str>,
    trace: &mut TraceRecorder,
) -> Result<ToolReply, ToolError> {
    trace.record("Executing web search", json!({"query": query}));
    let Some(query) = query else {
        return Ok(ToolReply::text("What would you like me to search for?"));
    };

    let decision =
        ctx.quota.check(ctx.identity, QuotaCategory::Search).await.map_err(quota_failure)?;
    if !decision.allowed {
        return Ok(ToolReply {
            output: ToolOutput::Json(json!({
                "type": "search_results",
                "error": "Sorry, I can't search the web because you've exceeded your monthly limit."
            })),
            charge: Charge::Refused(QuotaCategory::Search),
        });
    }

    let results = match ctx.collaborators.search.search(query).await {
        Ok(results) => results,
        Err(error @ ToolError::UpstreamFailure { .. }) => {
            warn!(event_name = "tool.search.failed", error = %error, "web search failed");
            trace.record("Search service error", error.to_string());
            return Ok(ToolReply {
                output: ToolOutput::Json(json!({
                    "type": "search_results",
                    "error": "Failed to perform search"
                })),
                charge: Charge::Unmetered,
            });
        }
        Err(other) => return Err(other),
    };

    trace.record("Retrieved search results", results.hits.len());
    ctx.quota.record(ctx.identity, QuotaCategory::Search).await.map_err(quota_failure)?;

    Ok(ToolReply {
        output: ToolOutput::Json(json!({
            "type": "search_results",
            "query": query,
            "spellcheck": results.spellcheck,
            "results": results.hits,
            "meta": {
                "total": results.hits.len(),
                "header": format!("Here's what I found on the web for \"{query}\""),
            },
        })),
        charge: Charge::Recorded(QuotaCategory::Search),
    })
}

struct HomeRequest<'a> {
    text: &'a str,
    action: Option<HomeAction>,
    domain: Option<HomeDomain>,
    area: Option<&'a str>,
    device_phrase: Option<&'a str>,
}

async fn smart_home(
    ctx: &ToolContext<'_>,
    request: HomeRequest<'_>,
    trace: &mut TraceRecorder,
) -> Result<ToolReply, ToolError> {
    let target = home::resolve_target(request.text, request.domain, request.action)?;
    trace.record(
        "Resolved smart-home target",
        json!({"domain": target.domain, "action": target.action}),
    );

    let devices = ctx.collaborators.smart_home.list_devices(target.domain).await?;
    trace.record("Fetched devices", devices.len());

    let calls = {
        let plan = PlanRequest {
            text: request.text,
            target,
            area: request.area,
            device_phrase: request.device_phrase,
            devices: &devices,
            routing: ctx.routing,
        };
        let mut rng = ctx.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        home::plan(&plan, &mut *rng, trace)?
    };

    let outcome = home::execute(ctx.collaborators.smart_home.as_ref(), target.domain, calls).await;
    trace.record("Device results", &outcome.results);

    Ok(ToolReply {
        output: ToolOutput::Json(json!({
            "type": "homeassistant",
            "summary": outcome.summary,
            "results": outcome.results,
        })),
        charge: Charge::Unmetered,
    })
}

pub fn music_action(text: &str) -> Option<MusicAction> {
    vocabulary::words(text).iter().find_map(|word| match word.as_str() {
        "play" | "resume" => Some(MusicAction::Play),
        "pause" | "stop" => Some(MusicAction::Pause),
        "next" | "skip" => Some(MusicAction::Next),
        "previous" | "back" => Some(MusicAction::Previous),
        _ => None,
    })
}

async fn music(
    ctx: &ToolContext<'_>,
    text: &str,
    trace: &mut TraceRecorder,
) -> Result<String, ToolError> {
    let action = music_action(text);
    trace.record("Executing music tool", action.map(|action| action.as_str()));

    if let Some(action) = action {
        ctx.collaborators.music.control(action).await?;
        let done = match action {
            MusicAction::Play => "Resuming playback.",
            MusicAction::Pause => "Paused playback.",
            MusicAction::Next => "Skipping to the next track.",
            MusicAction::Previous => "Going back to the previous track.",
        };
        return Ok(done.to_string());
    }

    Ok(match ctx.collaborators.music.now_playing().await? {
        Some(playing) => {
            let state = if playing.is_playing { "Now playing" } else { "Paused on" };
            let device = playing.device.map(|device| format!(" on {device}")).unwrap_or_default();
            format!("{state} {} by {}{device}.", playing.track, playing.artist)
        }
        None => "Nothing is playing right now.".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use neubot_core::domain::query::{DateSpec, EntityBag};
    use neubot_core::domain::tool::ToolKind;

    use super::{music_action, zone_or_default, ToolInvocation, ToolOutput};
    use crate::collaborators::MusicAction;

    #[test]
    fn calculator_needs_an_expression() {
        let empty = EntityBag::default();
        assert_eq!(ToolInvocation::build(ToolKind::Calculator, "5 +", &empty), None);

        let bag = EntityBag { math_expression: Some("5 + 3".to_string()), ..EntityBag::default() };
        let built = ToolInvocation::build(ToolKind::Calculator, "5 + 3", &bag).expect("built");
        assert_eq!(built.kind(), ToolKind::Calculator);
    }

    #[test]
    fn date_tools_default_to_today_in_caller_zone() {
        let bag = EntityBag { user_timezone: Some("Asia/Tokyo".to_string()), ..EntityBag::default() };
        assert_eq!(
            ToolInvocation::build(ToolKind::Day, "what day is it", &bag),
            Some(ToolInvocation::Day { date: DateSpec::Today, timezone: "Asia/Tokyo".to_string() })
        );
    }

    #[test]
    fn unknown_zones_fall_back_to_the_default() {
        assert_eq!(zone_or_default("Europe/Lisbon").name(), "Europe/Lisbon");
        assert_eq!(zone_or_default("Mars/Olympus").name(), "America/New_York");
    }

    #[test]
    fn music_words_map_to_player_actions() {
        assert_eq!(music_action("skip this song"), Some(MusicAction::Next));
        assert_eq!(music_action("resume the music"), Some(MusicAction::Play));
        assert_eq!(music_action("what song is this"), None);
    }

    #[test]
    fn json_output_renders_compactly() {
        let output = ToolOutput::Json(serde_json::json!({"type": "search_results"}));
        assert_eq!(output.render(), r#"{"type":"search_results"}"#);
    }
}
