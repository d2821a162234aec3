use std::time::Duration;

use anyhow::{bail, Context, Result};
use redis::{ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo};

use crate::constants::{
    DEFAULT_AUTH_RATE_LIMIT, DEFAULT_AUTH_RATE_WINDOW_SECONDS, DEFAULT_FORECAST_CACHE_TTL_SECONDS,
    DEFAULT_LISTEN_ADDR, DEFAULT_OPENWEATHER_BASE_URL, DEFAULT_REDIS_PORT,
    DEFAULT_REQUEST_TIMEOUT_SECONDS, DEFAULT_RESPONSE_CACHE_TTL_SECONDS, DEFAULT_USER_RATE_LIMIT,
    DEFAULT_USER_RATE_WINDOW_SECONDS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
    Disabled,
}

impl StoreBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            "none" | "off" | "disabled" => Ok(Self::Disabled),
            other => bail!("Unknown STORE_BACKEND={other} (expected redis, memory or none)"),
        }
    }
}

#[derive(Clone)]
pub struct RedisSettings {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub password: Option<String>,
}

impl RedisSettings {
    /// Connection details, or `None` when Redis has not been configured at all.
    /// Host settings bypass URL parsing, so passwords are used verbatim.
    pub fn connection_info(&self) -> Result<Option<ConnectionInfo>> {
        if let Some(url) = &self.url {
            let info = url
                .as_str()
                .into_connection_info()
                .context("Invalid REDIS_URL")?;
            return Ok(Some(info));
        }
        let Some(host) = &self.host else {
            return Ok(None);
        };
        Ok(Some(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.clone(), self.port),
            redis: RedisConnectionInfo {
                username: self.password.as_ref().map(|_| "default".to_string()),
                password: self.password.clone(),
                ..RedisConnectionInfo::default()
            },
        }))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitSettings {
    pub limit: u64,
    pub window_seconds: u64,
}

#[derive(Clone)]
pub struct Config {
    pub listen_addr: String,
    pub openweather_api_key: Option<String>,
    pub openweather_base_url: String,
    pub request_timeout: Duration,
    pub store_backend: StoreBackend,
    pub redis: RedisSettings,
    pub response_cache_ttl_seconds: u64,
    pub forecast_cache_ttl_seconds: u64,
    pub user_rate_limit: RateLimitSettings,
    pub auth_rate_limit: RateLimitSettings,
    /// Use `X-Forwarded-For` for client identity. Only safe behind a proxy
    /// that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = env_string("AGRI_LISTEN_ADDR", DEFAULT_LISTEN_ADDR);
        let openweather_api_key = env_optional("OPENWEATHER_API_KEY");
        let openweather_base_url = trim_base_url(&env_string(
            "OPENWEATHER_BASE_URL",
            DEFAULT_OPENWEATHER_BASE_URL,
        ));
        let request_timeout = Duration::from_secs(env_u64(
            "AGRI_REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?);
        let store_backend = StoreBackend::parse(&env_string("STORE_BACKEND", "redis"))?;
        let redis = RedisSettings {
            url: env_optional("REDIS_URL"),
            host: env_optional("REDIS_HOST"),
            port: env_u16("REDIS_PORT", DEFAULT_REDIS_PORT)?,
            password: env_optional("REDIS_PASSWORD"),
        };
        let response_cache_ttl_seconds = env_u64(
            "RESPONSE_CACHE_TTL_SECONDS",
            DEFAULT_RESPONSE_CACHE_TTL_SECONDS,
        )?;
        let forecast_cache_ttl_seconds = env_u64(
            "FORECAST_CACHE_TTL_SECONDS",
            DEFAULT_FORECAST_CACHE_TTL_SECONDS,
        )?;
        let user_rate_limit = RateLimitSettings {
            limit: env_u64("USER_RATE_LIMIT", DEFAULT_USER_RATE_LIMIT)?,
            window_seconds: env_u64("USER_RATE_WINDOW_SECONDS", DEFAULT_USER_RATE_WINDOW_SECONDS)?
                .max(1),
        };
        let auth_rate_limit = RateLimitSettings {
            limit: env_u64("AUTH_RATE_LIMIT", DEFAULT_AUTH_RATE_LIMIT)?,
            window_seconds: env_u64("AUTH_RATE_WINDOW_SECONDS", DEFAULT_AUTH_RATE_WINDOW_SECONDS)?
                .max(1),
        };
        let trust_forwarded_for = env_bool("TRUST_FORWARDED_FOR", false)?;

        Ok(Self {
            listen_addr,
            openweather_api_key,
            openweather_base_url,
            request_timeout,
            store_backend,
            redis,
            response_cache_ttl_seconds,
            forecast_cache_ttl_seconds,
            user_rate_limit,
            auth_rate_limit,
            trust_forwarded_for,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            openweather_api_key: None,
            openweather_base_url: DEFAULT_OPENWEATHER_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            store_backend: StoreBackend::Redis,
            redis: RedisSettings {
                url: None,
                host: None,
                port: DEFAULT_REDIS_PORT,
                password: None,
            },
            response_cache_ttl_seconds: DEFAULT_RESPONSE_CACHE_TTL_SECONDS,
            forecast_cache_ttl_seconds: DEFAULT_FORECAST_CACHE_TTL_SECONDS,
            user_rate_limit: RateLimitSettings {
                limit: DEFAULT_USER_RATE_LIMIT,
                window_seconds: DEFAULT_USER_RATE_WINDOW_SECONDS,
            },
            auth_rate_limit: RateLimitSettings {
                limit: DEFAULT_AUTH_RATE_LIMIT,
                window_seconds: DEFAULT_AUTH_RATE_WINDOW_SECONDS,
            },
            trust_forwarded_for: false,
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {}={} as u64", name, value)),
        Err(_) => Ok(default),
    }
}

fn env_u16(name: &str, default: u16) -> Result<u16> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u16>()
            .with_context(|| format!("Failed to parse {}={} as u16", name, value)),
        Err(_) => Ok(default),
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(value) => parse_bool(&value)
            .with_context(|| format!("Failed to parse {}={} as bool", name, value)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected true or false, got {other}"),
    }
}

fn trim_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}
