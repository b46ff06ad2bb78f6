use std::sync::Arc;

use neubot_core::clock::SystemClock;
use neubot_core::domain::quota::Identity;
use neubot_core::quota::QuotaEngine;
use neubot_db::SqlQuotaStore;

use crate::commands::{load_config, open_database, runtime, CommandResult};

pub fn run(identity: &str, authenticated: bool) -> CommandResult {
    let identity = if authenticated {
        Identity::User(identity.to_string())
    } else {
        Identity::Address(identity.to_string())
    };

    let config = match load_config("limits") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("limits") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let quota = QuotaEngine::new(
            Arc::new(SqlQuotaStore::new(pool.clone())),
            config.quota,
            Arc::new(SystemClock),
        );
        let status =
            quota.status(&identity).await.map_err(|error| ("persistence", error.to_string(), 6u8));
        pool.close().await;
        let status = status?;
        serde_json::to_string(&status).map_err(|error| ("serialization", error.to_string(), 7u8))
    });

    match result {
        Ok(status) => CommandResult::success("limits", status),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("limits", error_class, message, exit_code)
        }
    }
}
