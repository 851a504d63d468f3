//! Gateway configuration from `CRASHSTATS_*` environment variables
use crate::rate_limit::{authenticated_not_lower, RateSpec};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CONFIG/{key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub anonymous_rate: RateSpec,
    pub authenticated_rate: RateSpec,
    pub exempt_tokens: bool,
    pub trust_forwarded_for: bool,
    pub default_product: String,
    pub middleware_url: String,
    pub backend_timeout: Duration,
    pub identities_path: Option<PathBuf>,
    pub response_cache: bool,
    pub redis_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8787),
            anonymous_rate: RateSpec::per_minute(100),
            authenticated_rate: RateSpec::per_minute(1000),
            exempt_tokens: false,
            trust_forwarded_for: false,
            default_product: "WaterWolf".to_string(),
            middleware_url: "http://localhost:8883".to_string(),
            backend_timeout: Duration::from_millis(10_000),
            identities_path: None,
            response_cache: true,
            redis_url: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let kv = std::env::vars()
            .filter(|(k, _)| k.starts_with("CRASHSTATS_"))
            .collect::<HashMap<_, _>>();
        Self::from_kv(&kv)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = match non_empty(kv, "CRASHSTATS_BIND_ADDR") {
            None => defaults.bind_addr,
            Some(v) => v.parse::<SocketAddr>().map_err(|_| {
                ConfigError::invalid(
                    "CRASHSTATS_BIND_ADDR",
                    "must be a valid host:port socket address",
                )
            })?,
        };

        let anonymous_rate = parse_rate(kv, "CRASHSTATS_API_RATE_LIMIT", defaults.anonymous_rate)?;
        let authenticated_rate = parse_rate(
            kv,
            "CRASHSTATS_API_RATE_LIMIT_AUTHENTICATED",
            defaults.authenticated_rate,
        )?;
        if !authenticated_not_lower(&anonymous_rate, &authenticated_rate) {
            return Err(ConfigError::invalid(
                "CRASHSTATS_API_RATE_LIMIT_AUTHENTICATED",
                format!("{authenticated_rate} is lower than the anonymous rate {anonymous_rate}"),
            ));
        }

        let backend_timeout_ms = parse_u64(
            kv,
            "CRASHSTATS_BACKEND_TIMEOUT_MS",
            defaults.backend_timeout.as_millis() as u64,
        )?;
        if backend_timeout_ms == 0 {
            return Err(ConfigError::invalid("CRASHSTATS_BACKEND_TIMEOUT_MS", "must be > 0"));
        }

        let middleware_url = non_empty(kv, "CRASHSTATS_MIDDLEWARE_URL")
            .map(str::to_string)
            .unwrap_or(defaults.middleware_url);
        if url::Url::parse(&middleware_url).is_err() {
            return Err(ConfigError::invalid(
                "CRASHSTATS_MIDDLEWARE_URL",
                "must be an absolute URL",
            ));
        }

        Ok(Self {
            bind_addr,
            anonymous_rate,
            authenticated_rate,
            exempt_tokens: parse_bool(kv, "CRASHSTATS_RATE_LIMIT_EXEMPT_TOKENS", false)?,
            trust_forwarded_for: parse_bool(kv, "CRASHSTATS_TRUST_FORWARDED_FOR", false)?,
            default_product: non_empty(kv, "CRASHSTATS_DEFAULT_PRODUCT")
                .map(str::to_string)
                .unwrap_or(defaults.default_product),
            middleware_url,
            backend_timeout: Duration::from_millis(backend_timeout_ms),
            identities_path: non_empty(kv, "CRASHSTATS_IDENTITIES_PATH").map(PathBuf::from),
            response_cache: parse_bool(kv, "CRASHSTATS_RESPONSE_CACHE", true)?,
            redis_url: non_empty(kv, "CRASHSTATS_REDIS_URL").map(str::to_string),
        })
    }
}

fn non_empty<'a>(kv: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    kv.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_rate(
    kv: &HashMap<String, String>,
    key: &'static str,
    default: RateSpec,
) -> Result<RateSpec, ConfigError> {
    match non_empty(kv, key) {
        None => Ok(default),
        Some(v) => v.parse::<RateSpec>().map_err(|e| ConfigError::invalid(key, e)),
    }
}

fn parse_u64(
    kv: &HashMap<String, String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match non_empty(kv, key) {
        None => Ok(default),
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| ConfigError::invalid(key, "must be an integer")),
    }
}

fn parse_bool(
    kv: &HashMap<String, String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match non_empty(kv, key).map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::invalid(key, "must be true or false")),
    }
}
