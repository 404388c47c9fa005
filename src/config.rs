//! Runtime configuration, read from the environment (and `.env`, if present).

use std::env;

use chrono::Duration;
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Everything the authorization extractor needs.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub bot_token: String,
    pub login_max_age: Duration,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mongodb_uri: String,
    pub database: String,
    pub host: String,
    pub port: u16,
    pub allowed_origin: Option<String>,
    pub log_format: LogFormat,
    pub auth: AuthConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(var))
        };
        let port = match lookup("OPENSPLIT_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "OPENSPLIT_PORT",
                reason: format!("{raw:?} is not a port number"),
            })?,
            None => 8080,
        };
        let login_max_age = match lookup("OPENSPLIT_LOGIN_MAX_AGE_SECS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|secs| *secs > 0)
                .and_then(Duration::try_seconds)
                .ok_or_else(|| ConfigError::Invalid {
                    var: "OPENSPLIT_LOGIN_MAX_AGE_SECS",
                    reason: format!("{raw:?} is not a positive number of seconds"),
                })?,
            None => Duration::days(1),
        };
        let log_format = match lookup("OPENSPLIT_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "OPENSPLIT_LOG_FORMAT",
                    reason: format!("expected \"pretty\" or \"json\", got {other:?}"),
                })
            }
        };

        Ok(Config {
            mongodb_uri: required("MONGODB_URI")?,
            database: lookup("OPENSPLIT_DATABASE").unwrap_or_else(|| "OpenSplit".to_string()),
            host: lookup("OPENSPLIT_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            allowed_origin: lookup("OPENSPLIT_ALLOWED_ORIGIN"),
            log_format,
            auth: AuthConfig {
                bot_token: required("BOT_API_TOKEN")?,
                login_max_age,
            },
        })
    }

    /// Installs the global tracing subscriber. `RUST_LOG` wins over the
    /// default `info` filter.
    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        match self.log_format {
            LogFormat::Json => fmt().json().with_env_filter(filter).init(),
            LogFormat::Pretty => fmt().with_env_filter(filter).init(),
        }
    }
}
