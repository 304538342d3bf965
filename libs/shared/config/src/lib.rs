use std::env;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Business hours must open before they close ({open} >= {close})")]
    InvalidBusinessHours { open: NaiveTime, close: NaiveTime },

    #[error("Invalid duration bounds: min {min} / max {max} minutes")]
    InvalidDurationBounds { min: i64, max: i64 },

    #[error("Daily capacity must be at least 1")]
    ZeroDailyCapacity,

    #[error("Maximum contact attempts must be at least 1")]
    ZeroContactAttempts,

    #[error("Default waitlist priority {0} is outside 1..=10")]
    InvalidDefaultPriority(u8),
}

/// Business rules consumed by the scheduling and waitlist engines as plain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingPolicy {
    pub business_open: NaiveTime,
    pub business_close: NaiveTime,
    pub min_duration_minutes: i64,
    pub max_duration_minutes: i64,
    pub daily_capacity: usize,
    pub max_contact_attempts: u32,
    pub default_waitlist_priority: u8,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            business_open: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            business_close: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            min_duration_minutes: 30,
            max_duration_minutes: 240,
            daily_capacity: 20,
            max_contact_attempts: 3,
            default_waitlist_priority: 5,
        }
    }
}

impl SchedulingPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.business_open >= self.business_close {
            return Err(ConfigError::InvalidBusinessHours {
                open: self.business_open,
                close: self.business_close,
            });
        }
        if self.min_duration_minutes <= 0 || self.min_duration_minutes > self.max_duration_minutes {
            return Err(ConfigError::InvalidDurationBounds {
                min: self.min_duration_minutes,
                max: self.max_duration_minutes,
            });
        }
        if self.daily_capacity == 0 {
            return Err(ConfigError::ZeroDailyCapacity);
        }
        if self.max_contact_attempts == 0 {
            return Err(ConfigError::ZeroContactAttempts);
        }
        if !(1..=10).contains(&self.default_waitlist_priority) {
            return Err(ConfigError::InvalidDefaultPriority(self.default_waitlist_priority));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub scheduling: SchedulingPolicy,
    pub waitlist_sweep_interval_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduling: SchedulingPolicy::default(),
            waitlist_sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Missing or
    /// unparsable values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SchedulingPolicy::default();

        let scheduling = SchedulingPolicy {
            business_open: read_time(&lookup, "CLINIC_BUSINESS_OPEN", defaults.business_open),
            business_close: read_time(&lookup, "CLINIC_BUSINESS_CLOSE", defaults.business_close),
            min_duration_minutes: read_value(
                &lookup,
                "CLINIC_MIN_DURATION_MINUTES",
                defaults.min_duration_minutes,
            ),
            max_duration_minutes: read_value(
                &lookup,
                "CLINIC_MAX_DURATION_MINUTES",
                defaults.max_duration_minutes,
            ),
            daily_capacity: read_value(&lookup, "CLINIC_DAILY_CAPACITY", defaults.daily_capacity),
            max_contact_attempts: read_value(
                &lookup,
                "WAITLIST_MAX_CONTACT_ATTEMPTS",
                defaults.max_contact_attempts,
            ),
            default_waitlist_priority: read_value(
                &lookup,
                "WAITLIST_DEFAULT_PRIORITY",
                defaults.default_waitlist_priority,
            ),
        };

        let config = Self {
            scheduling,
            waitlist_sweep_interval_seconds: read_value(
                &lookup,
                "WAITLIST_SWEEP_INTERVAL_SECONDS",
                DEFAULT_SWEEP_INTERVAL_SECONDS,
            ),
        };

        if let Err(e) = config.scheduling.validate() {
            warn!("Scheduling policy from environment is invalid: {}", e);
        }

        config
    }
}

fn read_value<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has unparsable value '{}', using default {}", key, raw, default);
            default
        }),
        None => default,
    }
}

fn read_time<F>(lookup: &F, key: &str, default: NaiveTime) -> NaiveTime
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").unwrap_or_else(|_| {
            warn!("{} is not a HH:MM time ('{}'), using default {}", key, raw, default);
            default
        }),
        None => default,
    }
}
