use std::env;
use std::str::FromStr;
use tokio::time::Duration;
use url::Url;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub api_url: Url,
    pub cache_ttl: Duration,
    pub min_request_interval: Duration,
    pub cooldown: Duration,
    pub request_timeout: Duration,
    pub fetch_limit: u32,
    pub page_limit: u32,
    pub poll_interval: Duration,
}

impl TelemetryConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let raw_url = lookup("TELEMETRY_API_URL").ok_or(ConfigError::Missing("TELEMETRY_API_URL"))?;
        let api_url = Url::parse(raw_url.trim()).map_err(|e| ConfigError::Invalid {
            name: "TELEMETRY_API_URL",
            value: raw_url.clone(),
            reason: e.to_string(),
        })?;

        let defaults = Self::with_api_url(api_url);
        Ok(TelemetryConfig {
            cache_ttl: Duration::from_secs(parse_var(&lookup, "TELEMETRY_CACHE_TTL_SECS", 30)?),
            min_request_interval: Duration::from_millis(parse_var(
                &lookup,
                "TELEMETRY_MIN_REQUEST_INTERVAL_MS",
                1000,
            )?),
            cooldown: Duration::from_secs(parse_var(&lookup, "TELEMETRY_COOLDOWN_SECS", 60)?),
            request_timeout: Duration::from_secs(parse_var(
                &lookup,
                "TELEMETRY_REQUEST_TIMEOUT_SECS",
                10,
            )?),
            fetch_limit: parse_positive(&lookup, "TELEMETRY_FETCH_LIMIT", defaults.fetch_limit)?,
            page_limit: parse_positive(&lookup, "TELEMETRY_PAGE_LIMIT", defaults.page_limit)?,
            poll_interval: Duration::from_secs(parse_var(
                &lookup,
                "TELEMETRY_POLL_INTERVAL_SECS",
                30,
            )?),
            ..defaults
        })
    }

    /// Reference settings for the given endpoint
    pub fn with_api_url(api_url: Url) -> Self {
        TelemetryConfig {
            api_url,
            cache_ttl: Duration::from_secs(30),
            min_request_interval: Duration::from_secs(1),
            cooldown: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            fetch_limit: 1000,
            page_limit: 100,
            poll_interval: Duration::from_secs(30),
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = match lookup(name) {
        Some(value) => value,
        None => return Ok(default),
    };
    match value.trim().parse::<T>() {
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_positive<F>(lookup: &F, name: &'static str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    let value = parse_var(lookup, name, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}
