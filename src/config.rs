use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::auth::password::DEFAULT_COST;
use crate::ratelimit::RateLimitConfig;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Lifetimes of each token scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenTtls {
    pub authentication: chrono::Duration,
    pub activation: chrono::Duration,
    pub password_reset: chrono::Duration,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            authentication: chrono::Duration::hours(24),
            activation: chrono::Duration::hours(72),
            password_reset: chrono::Duration::minutes(45),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Postgres URL. Without one the server keeps everything in memory.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    pub limiter: RateLimitConfig,
    pub sweep_interval: Duration,
    pub storage_timeout: Duration,
    pub token_ttls: TokenTtls,
    pub bcrypt_cost: u32,
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            limiter: RateLimitConfig::default(),
            sweep_interval: Duration::from_secs(60),
            storage_timeout: Duration::from_millis(3000),
            token_ttls: TokenTtls::default(),
            bcrypt_cost: DEFAULT_COST,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to the defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let reader = Reader { lookup: &lookup };

        let rps: f64 = reader.parse("LIMITER_RPS", defaults.limiter.rps, "a number")?;
        if !(rps.is_finite() && rps > 0.0) {
            return Err(ConfigError::Invalid {
                key: "LIMITER_RPS",
                expected: "a positive number",
                value: rps.to_string(),
            });
        }

        let burst: u32 = reader.parse("LIMITER_BURST", defaults.limiter.burst, "an integer")?;
        // A zero-capacity bucket never admits anything.
        if burst == 0 {
            return Err(ConfigError::Invalid {
                key: "LIMITER_BURST",
                expected: "an integer of at least 1",
                value: burst.to_string(),
            });
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: reader.parse(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
                "an integer",
            )?,
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: reader.parse("SERVER_PORT", defaults.server_port, "a port number")?,
            limiter: RateLimitConfig {
                enabled: reader.flag("LIMITER_ENABLED", defaults.limiter.enabled)?,
                rps,
                burst,
                idle_timeout: Duration::from_secs(reader.parse(
                    "LIMITER_IDLE_TIMEOUT_SECS",
                    defaults.limiter.idle_timeout.as_secs(),
                    "a number of seconds",
                )?),
            },
            sweep_interval: Duration::from_secs(reader.parse(
                "LIMITER_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
                "a number of seconds",
            )?),
            storage_timeout: Duration::from_millis(reader.parse(
                "STORAGE_TIMEOUT_MS",
                3000,
                "a number of milliseconds",
            )?),
            token_ttls: TokenTtls {
                authentication: chrono::Duration::hours(reader.parse(
                    "AUTH_TOKEN_TTL_HOURS",
                    24,
                    "a number of hours",
                )?),
                activation: chrono::Duration::hours(reader.parse(
                    "ACTIVATION_TOKEN_TTL_HOURS",
                    72,
                    "a number of hours",
                )?),
                password_reset: chrono::Duration::minutes(reader.parse(
                    "PASSWORD_RESET_TOKEN_TTL_MINUTES",
                    45,
                    "a number of minutes",
                )?),
            },
            bcrypt_cost: reader.parse("BCRYPT_COST", defaults.bcrypt_cost, "an integer")?,
            shutdown_grace: Duration::from_secs(reader.parse(
                "SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace.as_secs(),
                "a number of seconds",
            )?),
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

struct Reader<'a, F> {
    lookup: &'a F,
}

impl<F> Reader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: FromStr>(
        &self,
        key: &'static str,
        default: T,
        expected: &'static str,
    ) -> Result<T, ConfigError> {
        match (self.lookup)(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                key,
                expected,
                value,
            }),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match (self.lookup)(key).as_deref().map(str::trim) {
            None => Ok(default),
            Some("1") | Some("true") | Some("TRUE") | Some("yes") => Ok(true),
            Some("0") | Some("false") | Some("FALSE") | Some("no") => Ok(false),
            Some(other) => Err(ConfigError::Invalid {
                key,
                expected: "true or false",
                value: other.to_string(),
            }),
        }
    }
}
