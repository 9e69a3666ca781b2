use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// Search radius for the initial broadcast scan, in kilometres.
    pub search_radius_km: f64,
    /// Multiplier applied to the radius when the escalation fallback rescans.
    pub fallback_radius_factor: f64,
    /// Default page size for candidate search.
    pub page_limit: usize,
    pub escalation_window_secs: u64,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub location_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            search_radius_km: 25.0,
            fallback_radius_factor: 2.0,
            page_limit: 5,
            escalation_window_secs: 10,
            poll_interval_secs: 5,
            request_timeout_secs: 5,
            location_timeout_secs: 20,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", defaults.search_radius_km)?,
            fallback_radius_factor: parse_or_default(
                "FALLBACK_RADIUS_FACTOR",
                defaults.fallback_radius_factor,
            )?,
            page_limit: parse_or_default("PAGE_LIMIT", defaults.page_limit)?,
            escalation_window_secs: parse_or_default(
                "ESCALATION_WINDOW_SECS",
                defaults.escalation_window_secs,
            )?,
            poll_interval_secs: parse_or_default("POLL_INTERVAL_SECS", defaults.poll_interval_secs)?,
            request_timeout_secs: parse_or_default(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            location_timeout_secs: parse_or_default(
                "LOCATION_TIMEOUT_SECS",
                defaults.location_timeout_secs,
            )?,
        })
    }

    pub fn escalation_window(&self) -> Duration {
        Duration::from_secs(self.escalation_window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_secs(self.location_timeout_secs)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
