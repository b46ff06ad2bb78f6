use std::sync::{Arc, Mutex};

use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use neubot_core::clock::Clock;
use neubot_core::config::RoutingConfig;
use neubot_core::domain::query::{EntityBag, Query, ThoughtStep};
use neubot_core::domain::quota::{Identity, QuotaCategory};
use neubot_core::domain::tool::{tool_names, ToolKind, ToolSet};
use neubot_core::errors::ApplicationError;
use neubot_core::quota::QuotaEngine;

use crate::collaborators::Collaborators;
use crate::entities::{self, extract_search_query};
use crate::highlight::highlight;
use crate::intent;
use crate::tools::{self, Charge, ToolContext, ToolInvocation};
use crate::trace::TraceRecorder;
use crate::vocabulary::{GREETING_REPLIES, HELP_SUFFIX};

pub const QUOTA_REFUSAL: &str =
    "Sorry, I can't respond because you've exceeded your monthly limit of queries.";
pub const NOTHING_THOUGHT: &str = "Nothing thought about.";
pub const NO_TOOL_REPLY: &str = "I understood your query but couldn't find the right tool to help.";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryResponse {
    pub response: String,
    pub thoughts: Vec<ThoughtStep>,
    pub highlighted_query: String,
    pub location: Option<String>,
}

impl QueryResponse {
    fn untraced(response: impl Into<String>, highlighted_query: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            thoughts: Vec::new(),
            highlighted_query: highlighted_query.into(),
            location: None,
        }
    }
}

/// How the finished query should be billed against the `total` counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Billing {
    Free,
    Total,
    AlreadyCharged,
}

/// Turns one utterance into a reply, a reasoning trace and a highlighted
/// copy of the input.
pub struct QueryRouter {
    collaborators: Collaborators,
    quota: QuotaEngine,
    clock: Arc<dyn Clock>,
    routing: RoutingConfig,
    default_timezone: String,
    rng: Mutex<StdRng>,
}

impl QueryRouter {
    pub fn new(
        collaborators: Collaborators,
        quota: QuotaEngine,
        clock: Arc<dyn Clock>,
        routing: RoutingConfig,
        default_timezone: impl Into<String>,
    ) -> Self {
        let rng = routing.rng_seed.map(StdRng::seed_from_u64).unwrap_or_else(StdRng::from_entropy);
        Self {
            collaborators,
            quota,
            clock,
            routing,
            default_timezone: default_timezone.into(),
            rng: Mutex::new(rng),
        }
    }

    pub fn quota(&self) -> &QuotaEngine {
        &self.quota
    }

    pub async fn handle(
        &self,
        query: &Query,
        identity: &Identity,
    ) -> Result<QueryResponse, ApplicationError> {
        let gate = self.quota.check(identity, QuotaCategory::Total).await?;
        if !gate.allowed {
            info!(
                event_name = "query.quota_refused",
                identity = %identity,
                "query refused by total quota"
            );
            return Ok(QueryResponse::untraced(QUOTA_REFUSAL, query.text()));
        }

        let (response, billing) = self.process(query, identity).await;
        if billing == Billing::Total {
            self.quota.record(identity, QuotaCategory::Total).await?;
        }

        info!(
            event_name = "query.answered",
            identity = %identity,
            thoughts = response.thoughts.len(),
            billing = ?billing,
            "query answered"
        );
        Ok(response)
    }

    fn resolve_timezone(&self, requested: &str) -> String {
        if requested.parse::<Tz>().is_ok() {
            requested.to_string()
        } else {
            self.default_timezone.clone()
        }
    }

    fn pick_greeting(&self) -> &'static str {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        GREETING_REPLIES.choose(&mut *rng).copied().unwrap_or("Hello!")
    }

    async fn process(&self, query: &Query, identity: &Identity) -> (QueryResponse, Billing) {
        let text = query.text();
        debug!(event_name = "query.received", identity = %identity, query = text, "processing query");

        if intent::is_disable_phrase(text) {
            return (QueryResponse::untraced(NOTHING_THOUGHT, text), Billing::Free);
        }

        let timezone = self.resolve_timezone(query.timezone());
        let mut trace = TraceRecorder::new();
        trace.record("Received query", text);
        trace.record("User timezone", &timezone);

        if intent::is_greeting_only(text) {
            trace.note("Detected greeting");
            let response = format!("{} {HELP_SUFFIX}", self.pick_greeting());
            let reply = QueryResponse {
                response,
                thoughts: trace.into_steps(),
                highlighted_query: highlight(text, None),
                location: None,
            };
            return (reply, Billing::Free);
        }

        let tokens = query.tokens();
        trace.record("Tokenized query", &tokens);

        let query_type = intent::query_type(&tokens, &mut trace);
        let mut tools = intent::identify_tools(text, query_type, &mut trace);
        let mut bag = entities::extract(text, &tools, &timezone, &mut trace);
        apply_search_fallback(text, &mut tools, &mut bag, &mut trace);

        let (responses, billing) = self.dispatch(text, &tools, &bag, identity, &mut trace).await;

        let mut response = if responses.is_empty() {
            NO_TOOL_REPLY.to_string()
        } else {
            responses.join(" ")
        };
        if !tools.is_empty() && intent::contains_greeting(text) {
            response = format!("{} {response}", self.pick_greeting());
        }
        trace.record("Generated final response", &response);

        let reply = QueryResponse {
            response,
            thoughts: trace.into_steps(),
            highlighted_query: highlight(text, bag.location.as_deref()),
            location: bag.location,
        };
        (reply, billing)
    }

    async fn dispatch(
        &self,
        text: &str,
        tools: &ToolSet,
        bag: &EntityBag,
        identity: &Identity,
        trace: &mut TraceRecorder,
    ) -> (Vec<String>, Billing) {
        if tools.is_empty() {
            return (Vec::new(), Billing::Total);
        }
        trace.record("Preparing to execute tools", tool_names(tools));

        let ctx = ToolContext {
            collaborators: &self.collaborators,
            quota: &self.quota,
            identity,
            clock: self.clock.as_ref(),
            routing: &self.routing,
            rng: &self.rng,
        };

        let mut responses = Vec::new();
        let mut billing = Billing::Total;
        for kind in tools {
            let Some(invocation) = ToolInvocation::build(*kind, text, bag) else {
                trace.record("Skipping tool without arguments", kind.as_str());
                continue;
            };

            match tools::run(&invocation, &ctx, trace).await {
                Ok(reply) => {
                    match reply.charge {
                        Charge::Unmetered => {}
                        Charge::Recorded(_) if billing == Billing::Total => {
                            billing = Billing::AlreadyCharged;
                        }
                        Charge::Recorded(_) => {}
                        Charge::Refused(_) => billing = Billing::Free,
                    }
                    let rendered = reply.output.render();
                    if !rendered.is_empty() {
                        responses.push(rendered);
                    }
                }
                Err(error) => {
                    warn!(
                        event_name = "tool.failed",
                        identity = %identity,
                        tool = kind.as_str(),
                        error_kind = error.kind(),
                        error = %error,
                        "tool failed"
                    );
                    trace.record("Tool error", json!({"tool": kind.as_str(), "error": error.to_string()}));
                    if error.is_quota_refusal() {
                        billing = Billing::Free;
                    }
                    responses.push(error.user_message());
                }
            }
        }
        (responses, billing)
    }
}

/// Routes to web search when nothing more specific can act, and keeps search
/// out of the way when something more specific can.
fn apply_search_fallback(
    text: &str,
    tools: &mut ToolSet,
    bag: &mut EntityBag,
    trace: &mut TraceRecorder,
) {
    let specific: Vec<ToolKind> =
        tools.iter().copied().filter(|tool| *tool != ToolKind::Search).collect();
    let incapable = |tool: ToolKind| match tool {
        ToolKind::Weather => bag.location.is_none(),
        ToolKind::Calculator => bag.math_expression.is_none(),
        _ => false,
    };

    let fall_back = match specific.as_slice() {
        [] => true,
        [only] => incapable(*only),
        _ => false,
    };

    if fall_back {
        if let [only] = specific.as_slice() {
            tools.remove(only);
            trace.record("Tool cannot act without arguments", only.as_str());
        }
        if bag.search_query.is_none() {
            bag.search_query = extract_search_query(text);
        }
        match &bag.search_query {
            Some(terms) => {
                tools.insert(ToolKind::Search);
                trace.record("Inferred search tool", json!({"terms": terms}));
            }
            None => {
                tools.remove(&ToolKind::Search);
            }
        }
    }

    if tools.contains(&ToolKind::Search) && tools.len() > 1 {
        tools.remove(&ToolKind::Search);
        trace.record("Preferring specific tools over search", tool_names(tools));
    }
}

#[cfg(test)]
mod tests {
    use neubot_core::domain::query::EntityBag;
    use neubot_core::domain::tool::{ToolKind, ToolSet};

    use super::apply_search_fallback;
    use crate::trace::TraceRecorder;

    fn fallback(text: &str, tools: &[ToolKind], bag: EntityBag) -> (Vec<ToolKind>, EntityBag) {
        let mut set: ToolSet = tools.iter().copied().collect();
        let mut bag = bag;
        apply_search_fallback(text, &mut set, &mut bag, &mut TraceRecorder::new());
        (set.into_iter().collect(), bag)
    }

    #[test]
    fn empty_tool_set_becomes_search() {
        let (tools, bag) = fallback("search for rust lifetimes", &[], EntityBag::default());
        assert_eq!(tools, [ToolKind::Search]);
        assert_eq!(bag.search_query.as_deref(), Some("rust lifetimes"));
    }

    #[test]
    fn weather_without_location_is_replaced_by_search() {
        let (tools, _) = fallback("what is the weather like", &[ToolKind::Weather], EntityBag::default());
        assert_eq!(tools, [ToolKind::Search]);
    }

    #[test]
    fn specific_tools_push_search_out() {
        let bag = EntityBag { location: Some("Paris".to_string()), ..EntityBag::default() };
        let (tools, _) = fallback("search the weather in Paris", &[ToolKind::Search, ToolKind::Weather], bag);
        assert_eq!(tools, [ToolKind::Weather]);

        let (tools, _) =
            fallback("time and weather", &[ToolKind::Time, ToolKind::Weather], EntityBag::default());
        assert_eq!(tools, [ToolKind::Time, ToolKind::Weather]);
    }
}
