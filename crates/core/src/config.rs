use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::query::DEFAULT_TIMEZONE;
use crate::domain::quota::{QuotaLimits, QuotaTiers};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub quota: QuotaTiers,
    pub routing: RoutingConfig,
    pub integrations: IntegrationsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub default_timezone: String,
}

/// Heuristic knobs for the smart-home interpreter and the router.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutingConfig {
    pub min_device_tokens: usize,
    pub min_color_words: usize,
    pub min_toggle_verbs: usize,
    pub min_fuzzy_score: i64,
    pub rng_seed: Option<u64>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            min_device_tokens: 2,
            min_color_words: 2,
            min_toggle_verbs: 2,
            min_fuzzy_score: 60,
            rng_seed: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IntegrationsConfig {
    pub openweather_api_key: Option<SecretString>,
    pub brave_search_token: Option<SecretString>,
    pub home_assistant_url: Option<String>,
    pub home_assistant_token: Option<SecretString>,
    pub spotify_access_token: Option<SecretString>,
    pub geocoder_url: String,
    pub timezone_url: String,
    pub http_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub port: Option<u16>,
    pub default_timezone: Option<String>,
    pub rng_seed: Option<u64>,
    pub home_assistant_url: Option<String>,
    pub home_assistant_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://neubot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 5300,
                default_timezone: DEFAULT_TIMEZONE.to_string(),
            },
            quota: QuotaTiers::default(),
            routing: RoutingConfig::default(),
            integrations: IntegrationsConfig {
                openweather_api_key: None,
                brave_search_token: None,
                home_assistant_url: None,
                home_assistant_token: None,
                spotify_access_token: None,
                geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
                timezone_url: "https://api.open-meteo.com".to_string(),
                http_timeout_secs: 10,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl IntegrationsConfig {
    pub fn home_assistant_ready(&self) -> bool {
        self.home_assistant_url.is_some() && has_secret(&self.home_assistant_token)
    }

    pub fn weather_ready(&self) -> bool {
        has_secret(&self.openweather_api_key)
    }

    pub fn search_ready(&self) -> bool {
        has_secret(&self.brave_search_token)
    }

    pub fn music_ready(&self) -> bool {
        has_secret(&self.spotify_access_token)
    }
}

fn has_secret(value: &Option<SecretString>) -> bool {
    value.as_ref().map(|secret| !secret.expose_secret().trim().is_empty()).unwrap_or(false)
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("neubot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(default_timezone) = server.default_timezone {
                self.server.default_timezone = default_timezone;
            }
        }

        if let Some(quota) = patch.quota {
            if let Some(guest) = quota.guest {
                guest.apply_to(&mut self.quota.guest);
            }
            if let Some(authenticated) = quota.authenticated {
                authenticated.apply_to(&mut self.quota.authenticated);
            }
        }

        if let Some(routing) = patch.routing {
            if let Some(value) = routing.min_device_tokens {
                self.routing.min_device_tokens = value;
            }
            if let Some(value) = routing.min_color_words {
                self.routing.min_color_words = value;
            }
            if let Some(value) = routing.min_toggle_verbs {
                self.routing.min_toggle_verbs = value;
            }
            if let Some(value) = routing.min_fuzzy_score {
                self.routing.min_fuzzy_score = value;
            }
            if let Some(value) = routing.rng_seed {
                self.routing.rng_seed = Some(value);
            }
        }

        if let Some(integrations) = patch.integrations {
            if let Some(value) = integrations.openweather_api_key {
                self.integrations.openweather_api_key = Some(secret_value(value));
            }
            if let Some(value) = integrations.brave_search_token {
                self.integrations.brave_search_token = Some(secret_value(value));
            }
            if let Some(value) = integrations.home_assistant_url {
                self.integrations.home_assistant_url = Some(value);
            }
            if let Some(value) = integrations.home_assistant_token {
                self.integrations.home_assistant_token = Some(secret_value(value));
            }
            if let Some(value) = integrations.spotify_access_token {
                self.integrations.spotify_access_token = Some(secret_value(value));
            }
            if let Some(value) = integrations.geocoder_url {
                self.integrations.geocoder_url = value;
            }
            if let Some(value) = integrations.timezone_url {
                self.integrations.timezone_url = value;
            }
            if let Some(value) = integrations.http_timeout_secs {
                self.integrations.http_timeout_secs = value;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("NEUBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("NEUBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("NEUBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("NEUBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("NEUBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("NEUBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("NEUBOT_SERVER_PORT") {
            self.server.port = parse_u16("NEUBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("NEUBOT_DEFAULT_TIMEZONE") {
            self.server.default_timezone = value;
        }

        if let Some(value) = read_env("NEUBOT_QUOTA_GUEST_SEARCH") {
            self.quota.guest.search = parse_u32("NEUBOT_QUOTA_GUEST_SEARCH", &value)?;
        }
        if let Some(value) = read_env("NEUBOT_QUOTA_GUEST_WEATHER") {
            self.quota.guest.weather = parse_u32("NEUBOT_QUOTA_GUEST_WEATHER", &value)?;
        }
        if let Some(value) = read_env("NEUBOT_QUOTA_GUEST_TOTAL") {
            self.quota.guest.total = parse_u32("NEUBOT_QUOTA_GUEST_TOTAL", &value)?;
        }

        if let Some(value) = read_env("NEUBOT_RNG_SEED") {
            self.routing.rng_seed = Some(parse_u64("NEUBOT_RNG_SEED", &value)?);
        }

        // The unprefixed names are what existing deployments already export.
        let weather_key =
            read_env("NEUBOT_OPENWEATHER_API_KEY").or_else(|| read_env("OPENWEATHER_API_KEY"));
        if let Some(value) = weather_key {
            self.integrations.openweather_api_key = Some(secret_value(value));
        }
        let search_token =
            read_env("NEUBOT_BRAVE_SEARCH_TOKEN").or_else(|| read_env("BRAVE_SEARCH_TOKEN"));
        if let Some(value) = search_token {
            self.integrations.brave_search_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("NEUBOT_HOME_ASSISTANT_URL") {
            self.integrations.home_assistant_url = Some(value);
        }
        if let Some(value) = read_env("NEUBOT_HOME_ASSISTANT_TOKEN") {
            self.integrations.home_assistant_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("NEUBOT_SPOTIFY_ACCESS_TOKEN") {
            self.integrations.spotify_access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("NEUBOT_HTTP_TIMEOUT_SECS") {
            self.integrations.http_timeout_secs = parse_u64("NEUBOT_HTTP_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("NEUBOT_LOGGING_LEVEL").or_else(|| read_env("NEUBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("NEUBOT_LOGGING_FORMAT").or_else(|| read_env("NEUBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(default_timezone) = overrides.default_timezone {
            self.server.default_timezone = default_timezone;
        }
        if let Some(rng_seed) = overrides.rng_seed {
            self.routing.rng_seed = Some(rng_seed);
        }
        if let Some(url) = overrides.home_assistant_url {
            self.integrations.home_assistant_url = Some(url);
        }
        if let Some(token) = overrides.home_assistant_token {
            self.integrations.home_assistant_token = Some(secret_value(token));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_quota(&self.quota)?;
        validate_routing(&self.routing)?;
        validate_integrations(&self.integrations)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("neubot.toml"), PathBuf::from("config/neubot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.default_timezone.parse::<chrono_tz::Tz>().is_err() {
        return Err(ConfigError::Validation(format!(
            "server.default_timezone `{}` is not an IANA timezone id",
            server.default_timezone
        )));
    }

    Ok(())
}

fn validate_quota(tiers: &QuotaTiers) -> Result<(), ConfigError> {
    let pairs = [
        ("search", tiers.guest.search, tiers.authenticated.search),
        ("weather", tiers.guest.weather, tiers.authenticated.weather),
        ("total", tiers.guest.total, tiers.authenticated.total),
    ];

    for (category, guest, authenticated) in pairs {
        if guest == 0 {
            return Err(ConfigError::Validation(format!(
                "quota.guest.{category} must be greater than zero"
            )));
        }
        if authenticated <= guest {
            return Err(ConfigError::Validation(format!(
                "quota.authenticated.{category} ({authenticated}) must exceed quota.guest.{category} ({guest})"
            )));
        }
    }

    Ok(())
}

fn validate_routing(routing: &RoutingConfig) -> Result<(), ConfigError> {
    if routing.min_device_tokens == 0
        || routing.min_color_words == 0
        || routing.min_toggle_verbs == 0
    {
        return Err(ConfigError::Validation(
            "routing clause thresholds must be greater than zero".to_string(),
        ));
    }

    if routing.min_fuzzy_score < 0 {
        return Err(ConfigError::Validation(
            "routing.min_fuzzy_score must not be negative".to_string(),
        ));
    }

    Ok(())
}

fn validate_integrations(integrations: &IntegrationsConfig) -> Result<(), ConfigError> {
    if integrations.http_timeout_secs == 0 || integrations.http_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "integrations.http_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    let urls = [
        ("integrations.geocoder_url", Some(&integrations.geocoder_url)),
        ("integrations.timezone_url", Some(&integrations.timezone_url)),
        ("integrations.home_assistant_url", integrations.home_assistant_url.as_ref()),
    ];
    for (key, url) in urls {
        if let Some(url) = url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{key} must start with http:// or https://"
                )));
            }
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    quota: Option<QuotaPatch>,
    routing: Option<RoutingPatch>,
    integrations: Option<IntegrationsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    default_timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QuotaPatch {
    guest: Option<QuotaLimitsPatch>,
    authenticated: Option<QuotaLimitsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct QuotaLimitsPatch {
    search: Option<u32>,
    weather: Option<u32>,
    total: Option<u32>,
}

impl QuotaLimitsPatch {
    fn apply_to(self, limits: &mut QuotaLimits) {
        if let Some(search) = self.search {
            limits.search = search;
        }
        if let Some(weather) = self.weather {
            limits.weather = weather;
        }
        if let Some(total) = self.total {
            limits.total = total;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    min_device_tokens: Option<usize>,
    min_color_words: Option<usize>,
    min_toggle_verbs: Option<usize>,
    min_fuzzy_score: Option<i64>,
    rng_seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IntegrationsPatch {
    openweather_api_key: Option<String>,
    brave_search_token: Option<String>,
    home_assistant_url: Option<String>,
    home_assistant_token: Option<String>,
    spotify_access_token: Option<String>,
    geocoder_url: Option<String>,
    timezone_url: Option<String>,
    http_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
