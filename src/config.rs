use std::{env, time::Duration};

use crate::error::ConfigError;

/// Fallback signing secret used only when running with `APP_ENV=local`.
pub const LOCAL_AUTH_SECRET: &str = "grimoire-local-development-secret";

/// AppConfig
///
/// Holds the application's entire configuration state. It is loaded once at startup,
/// never mutated afterwards, and shared with every request through `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls fallbacks and log format.
    pub env: Env,
    // Postgres connection string. `None` selects the in-memory repositories (local only).
    pub db_url: Option<String>,
    // Upper bound of the Postgres pool.
    pub db_max_connections: u32,
    // HMAC secret used to sign and verify session tokens.
    pub auth_secret: String,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Requests running longer than this are aborted (their transaction rolls back).
    pub request_timeout: Duration,
}

/// Env
///
/// Runtime context. Production refuses to start without real secrets, local
/// development gets working defaults.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe, non-panicking configuration for tests: local mode, in-memory storage.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            db_max_connections: 5,
            auth_secret: LOCAL_AUTH_SECRET.to_string(),
            bind_addr: "127.0.0.1:8080".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from the environment. Fails fast: production without
    /// `AUTH_SECRET` or a database location is an error, so the process never starts
    /// half-configured.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let auth_secret = match (env, non_empty_var("AUTH_SECRET")) {
            (_, Some(secret)) => secret,
            (Env::Local, None) => LOCAL_AUTH_SECRET.to_string(),
            (Env::Production, None) => return Err(ConfigError::Missing("AUTH_SECRET")),
        };

        let db_url = non_empty_var("DATABASE_URL").or_else(postgres_url_from_parts);
        if env == Env::Production && db_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            env,
            db_url,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 5)?,
            auth_secret,
            bind_addr: non_empty_var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            request_timeout: Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 30)?),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Builds a connection string from the discrete `POSTGRES_*` variables when all
/// of them are present.
fn postgres_url_from_parts() -> Option<String> {
    let host = non_empty_var("POSTGRES_HOST")?;
    let port = non_empty_var("POSTGRES_PORT").unwrap_or_else(|| "5432".to_string());
    let user = non_empty_var("POSTGRES_USER")?;
    let password = non_empty_var("POSTGRES_PASSWORD")?;
    let db = non_empty_var("POSTGRES_DB")?;
    Some(format!("postgresql://{user}:{password}@{host}:{port}/{db}"))
}
