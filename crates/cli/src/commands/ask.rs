use std::sync::Arc;

use neubot_agent::{Collaborators, QueryRouter};
use neubot_core::clock::SystemClock;
use neubot_core::domain::query::Query;
use neubot_core::domain::quota::Identity;
use neubot_core::quota::QuotaEngine;
use neubot_db::SqlQuotaStore;

use crate::commands::{load_config, open_database, runtime, CommandResult};

/// Usage from `ask` is billed to this guest identity.
pub const LOCAL_IDENTITY: &str = "127.0.0.1";

pub fn run(text: &str, timezone: Option<&str>) -> CommandResult {
    if text.trim().is_empty() {
        return CommandResult::failure("ask", "invalid_input", "No query provided", 1);
    }

    let config = match load_config("ask") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("ask") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let clock = Arc::new(SystemClock);
        let quota =
            QuotaEngine::new(Arc::new(SqlQuotaStore::new(pool.clone())), config.quota, clock.clone());
        let router = QueryRouter::new(
            Collaborators::offline(),
            quota,
            clock,
            config.routing,
            config.server.default_timezone.clone(),
        );

        let timezone = timezone.unwrap_or(config.server.default_timezone.as_str());
        let reply = router
            .handle(&Query::new(text, timezone), &Identity::Address(LOCAL_IDENTITY.to_string()))
            .await
            .map_err(|error| ("query", error.to_string(), 6u8));
        pool.close().await;
        reply
    });

    match result {
        Ok(reply) => CommandResult::success("ask", reply.response),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}
