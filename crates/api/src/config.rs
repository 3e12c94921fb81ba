//! Application configuration

use std::env;
use std::str::FromStr;

use helpdesk_shared::{BusinessHours, SlaPolicy};
use time::{UtcOffset, Weekday};

/// Upper bound for SLA budgets and the risk window, ten years of minutes
pub const MAX_SLA_MINUTES: i64 = 10 * 366 * 24 * 60;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database (unset runs on the in-memory store)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,

    // SLA
    pub business_hours: BusinessHours,
    pub sla_first_response_minutes: i64,
    pub sla_resolution_minutes: i64,
    pub sla_risk_window_minutes: i64,

    // Streaming
    pub stream_heartbeat_secs: u64,
    pub stream_buffer: usize,

    // Listing
    pub list_max_page_size: u32,
}

impl Config {
    /// Defaults for everything except the signing secret
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            database_url: None,
            database_max_connections: 10,
            jwt_secret: jwt_secret.into(),
            business_hours: BusinessHours::default(),
            sla_first_response_minutes: 240,
            sla_resolution_minutes: 1440,
            sla_risk_window_minutes: 60,
            stream_heartbeat_secs: 25,
            stream_buffer: 64,
            list_max_page_size: 100,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = {
            let secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
            // Ensure the signing key is cryptographically strong
            if secret.len() < 32 {
                return Err(ConfigError::WeakSecret(
                    "JWT_SECRET must be at least 32 characters",
                ));
            }
            secret
        };
        let defaults = Self::new(jwt_secret);

        let start_hour = parse_var("BUSINESS_HOURS_START", defaults.business_hours.start_hour())?;
        let end_hour = parse_var("BUSINESS_HOURS_END", defaults.business_hours.end_hour())?;
        let days = match env::var("BUSINESS_DAYS") {
            Ok(raw) => parse_weekdays(&raw)?,
            Err(_) => vec![
                Weekday::Monday,
                Weekday::Tuesday,
                Weekday::Wednesday,
                Weekday::Thursday,
                Weekday::Friday,
            ],
        };
        let offset_minutes: i32 = parse_var("BUSINESS_UTC_OFFSET_MINUTES", 0)?;
        let offset = offset_minutes
            .checked_mul(60)
            .and_then(|secs| UtcOffset::from_whole_seconds(secs).ok())
            .ok_or_else(|| ConfigError::Invalid {
                var: "BUSINESS_UTC_OFFSET_MINUTES",
                reason: format!("{} is not a valid UTC offset", offset_minutes),
            })?;
        let business_hours =
            BusinessHours::new(start_hour, end_hour, &days, offset).map_err(|e| {
                ConfigError::Invalid {
                    var: "BUSINESS_HOURS_START",
                    reason: e.to_string(),
                }
            })?;

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),

            // Database
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            database_max_connections: parse_var(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,

            jwt_secret: defaults.jwt_secret,

            // SLA
            business_hours,
            sla_first_response_minutes: parse_minutes(
                "SLA_FIRST_RESPONSE_MINUTES",
                defaults.sla_first_response_minutes,
            )?,
            sla_resolution_minutes: parse_minutes(
                "SLA_RESOLUTION_MINUTES",
                defaults.sla_resolution_minutes,
            )?,
            sla_risk_window_minutes: parse_minutes(
                "SLA_RISK_WINDOW_MINUTES",
                defaults.sla_risk_window_minutes,
            )?,

            // Streaming
            stream_heartbeat_secs: parse_var("STREAM_HEARTBEAT_SECS", defaults.stream_heartbeat_secs)?
                .max(1),
            stream_buffer: parse_var("STREAM_BUFFER", defaults.stream_buffer)?.max(1),

            list_max_page_size: parse_var("LIST_MAX_PAGE_SIZE", defaults.list_max_page_size)?.max(1),
        })
    }

    pub fn sla_policy(&self) -> SlaPolicy {
        SlaPolicy::new(
            self.business_hours.clone(),
            self.sla_first_response_minutes,
            self.sla_resolution_minutes,
        )
    }

    pub fn risk_window(&self) -> time::Duration {
        time::Duration::minutes(self.sla_risk_window_minutes)
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stream_heartbeat_secs)
    }
}

/// Read an optional variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: name,
            reason: format!("cannot parse {:?}", raw),
        }),
        Err(_) => Ok(default),
    }
}

/// A minute count in `0..=MAX_SLA_MINUTES`
fn parse_minutes(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    let value = parse_var(name, default)?;
    if !(0..=MAX_SLA_MINUTES).contains(&value) {
        return Err(ConfigError::Invalid {
            var: name,
            reason: format!("must be between 0 and {}", MAX_SLA_MINUTES),
        });
    }
    Ok(value)
}

/// Comma-separated weekday names, e.g. `mon,tue,wed`
fn parse_weekdays(raw: &str) -> Result<Vec<Weekday>, ConfigError> {
    let days = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|day| {
            let day = day.to_ascii_lowercase();
            let weekday = match day.get(..3) {
                Some("mon") => Weekday::Monday,
                Some("tue") => Weekday::Tuesday,
                Some("wed") => Weekday::Wednesday,
                Some("thu") => Weekday::Thursday,
                Some("fri") => Weekday::Friday,
                Some("sat") => Weekday::Saturday,
                Some("sun") => Weekday::Sunday,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "BUSINESS_DAYS",
                        reason: format!("unknown weekday {:?}", day),
                    })
                }
            };
            Ok(weekday)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if days.is_empty() {
        return Err(ConfigError::Invalid {
            var: "BUSINESS_DAYS",
            reason: "at least one working day is required".to_string(),
        });
    }
    Ok(days)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}
