use std::sync::Arc;

use neubot_agent::QueryRouter;
use neubot_core::clock::SystemClock;
use neubot_core::config::{AppConfig, ConfigError, LoadOptions};
use neubot_core::quota::QuotaEngine;
use neubot_db::{connection::connect_from_config, migrations, DbPool, SqlQuotaStore};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;
use crate::clients;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub router: Arc<QueryRouter>,
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState {
            router: self.router.clone(),
            default_timezone: self.config.server.default_timezone.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client setup failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let integrations = &config.integrations;
    info!(
        event_name = "system.bootstrap.integrations",
        correlation_id = "bootstrap",
        weather = integrations.weather_ready(),
        search = integrations.search_ready(),
        home_assistant = integrations.home_assistant_ready(),
        music = integrations.music_ready(),
        "integration readiness resolved"
    );
    let collaborators = clients::build(integrations).map_err(BootstrapError::HttpClient)?;

    let clock = Arc::new(SystemClock);
    let quota =
        QuotaEngine::new(Arc::new(SqlQuotaStore::new(db_pool.clone())), config.quota, clock.clone());
    let router = QueryRouter::new(
        collaborators,
        quota,
        clock,
        config.routing,
        config.server.default_timezone.clone(),
    );

    Ok(Application { config, db_pool, router: Arc::new(router) })
}

#[cfg(test)]
mod tests {
    use neubot_core::config::{ConfigOverrides, LoadOptions};
    use neubot_core::domain::query::Query;
    use neubot_core::domain::quota::Identity;

    use crate::bootstrap::bootstrap;

    fn options(database_url: &str, timezone: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                default_timezone: Some(timezone.to_string()),
                rng_seed: Some(5),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_rejects_unknown_default_timezone() {
        let result = bootstrap(options("sqlite::memory:", "Atlantis/Capital")).await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("default_timezone"), "{message}");
    }

    #[tokio::test]
    async fn bootstrapped_router_answers_and_persists_usage() {
        let app = bootstrap(options("sqlite::memory:?cache=shared", "Europe/Lisbon"))
            .await
            .expect("bootstrap should succeed");
        let caller = Identity::Address("203.0.113.9".to_string());

        let reply = app
            .router
            .handle(&Query::new("what is 6 times 7", "Europe/Lisbon"), &caller)
            .await
            .expect("query");
        assert_eq!(reply.response, "6 * 7 = 42");

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quota_request WHERE category = 'total'")
            .fetch_one(&app.db_pool)
            .await
            .expect("count");
        assert_eq!(rows, 1);
        assert_eq!(app.api_state().default_timezone, "Europe/Lisbon");

        app.db_pool.close().await;
    }
}
