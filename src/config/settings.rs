//! Process settings read from the environment (after loading `.env`).

use crate::error::ConfigError;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_ROUTE_CACHE: &str = "cache/routes.json";
pub const DEFAULT_SUBSCRIBER_CACHE: &str = "cache/subscribers.json";
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Production trusts cache artifacts as-is; development rebuilds them on every start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppMode {
    Production,
    Development,
}

impl AppMode {
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "production" || v == "prod" => AppMode::Production,
            _ => AppMode::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, AppMode::Production)
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub mode: AppMode,
    pub bind_addr: String,
    /// Selects the PostgreSQL engine; the in-memory engine is used without it.
    pub database_url: Option<String>,
    pub route_cache_path: PathBuf,
    pub subscriber_cache_path: PathBuf,
    pub body_limit_bytes: usize,
    pub auth_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            mode: AppMode::Development,
            bind_addr: DEFAULT_BIND_ADDR.into(),
            database_url: None,
            route_cache_path: DEFAULT_ROUTE_CACHE.into(),
            subscriber_cache_path: DEFAULT_SUBSCRIBER_CACHE.into(),
            body_limit_bytes: DEFAULT_BODY_LIMIT,
            auth_token: None,
        }
    }
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset and empty values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();
        let body_limit_bytes = match get("BODY_LIMIT_BYTES") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| ConfigError::Invalid {
                key: "BODY_LIMIT_BYTES",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => defaults.body_limit_bytes,
        };
        Ok(Settings {
            mode: AppMode::from_env_value(get("APP_ENV").as_deref()),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: get("DATABASE_URL"),
            route_cache_path: get("ROUTE_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.route_cache_path),
            subscriber_cache_path: get("SUBSCRIBER_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.subscriber_cache_path),
            body_limit_bytes,
            auth_token: get("AUTH_TOKEN"),
        })
    }
}
