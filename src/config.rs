use std::env;
use std::str::FromStr;

use chrono_tz::Tz;
use dotenvy::dotenv;

use crate::attendance::AttendancePolicy;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub server_addr: String,
    pub api_prefix: String,
    pub log_level: String,

    /// Zone every civil date/time is normalized to.
    pub timezone: Tz,

    // Attendance timing, in minutes
    pub debounce_minutes: i64,
    pub slot_tolerance_minutes: i64,
    pub present_tolerance_minutes: i64,
    pub finalize_delay_minutes: i64,

    pub finalizer_workers: usize,
    pub card_cache_ttl_secs: u64,

    // Rate limiting
    pub rate_tap_per_min: u32,
    pub rate_login_per_min: u32,
    pub rate_admin_per_min: u32,
}

/// Env values that could not be used; reported once logging is up.
#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings(Vec<String>);

impl ConfigWarnings {
    pub fn log(&self) {
        for warning in &self.0 {
            tracing::warn!("{warning}, using default");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<&str>, default: T, warnings: &mut ConfigWarnings) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warnings.0.push(format!("{key}='{raw}' is not a valid value"));
            default
        }),
        None => default,
    }
}

/// Minute counts feed chrono durations; a negative one would disable the rule.
fn minutes_or(key: &str, raw: Option<&str>, default: i64, warnings: &mut ConfigWarnings) -> i64 {
    let minutes = parse_or(key, raw, default, warnings);
    if minutes < 0 {
        warnings.0.push(format!("{key}={minutes} must not be negative"));
        return default;
    }
    minutes
}

fn env_or<T: FromStr>(key: &str, default: T, warnings: &mut ConfigWarnings) -> T {
    parse_or(key, env::var(key).ok().as_deref(), default, warnings)
}

fn env_minutes_or(key: &str, default: i64, warnings: &mut ConfigWarnings) -> i64 {
    minutes_or(key, env::var(key).ok().as_deref(), default, warnings)
}

impl Config {
    /// Reads `.env` and the environment. Unusable values fall back to their
    /// defaults and come back as warnings, to be logged once the subscriber is set.
    pub fn from_env() -> anyhow::Result<(Self, ConfigWarnings)> {
        dotenv().ok();
        let mut w = ConfigWarnings::default();

        let tz_name = env::var("INSTITUTION_TZ").unwrap_or_else(|_| "Europe/Madrid".to_string());
        let timezone: Tz = tz_name
            .parse()
            .map_err(|e| anyhow::anyhow!("INSTITUTION_TZ '{tz_name}' is not a valid zone: {e}"))?;

        let config = Self {
            server_addr: env::var("SERVER_ADDR")
                .map_err(|_| anyhow::anyhow!("SERVER_ADDR must be set"))?,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            timezone,

            debounce_minutes: env_minutes_or("DEBOUNCE_MINUTES", 5, &mut w),
            slot_tolerance_minutes: env_minutes_or("SLOT_TOLERANCE_MINUTES", 20, &mut w),
            present_tolerance_minutes: env_minutes_or("PRESENT_TOLERANCE_MINUTES", 15, &mut w),
            finalize_delay_minutes: env_minutes_or("FINALIZE_DELAY_MINUTES", 10, &mut w),

            finalizer_workers: env_or("FINALIZER_WORKERS", 2usize, &mut w).max(1),
            card_cache_ttl_secs: env_or("CARD_CACHE_TTL_SECS", 86_400, &mut w), // 24h

            rate_tap_per_min: env_or("RATE_TAP_PER_MIN", 600, &mut w),
            rate_login_per_min: env_or("RATE_LOGIN_PER_MIN", 60, &mut w),
            rate_admin_per_min: env_or("RATE_ADMIN_PER_MIN", 60, &mut w),
        };

        Ok((config, w))
    }

    pub fn policy(&self) -> AttendancePolicy {
        AttendancePolicy {
            debounce: chrono::Duration::minutes(self.debounce_minutes),
            slot_tolerance: chrono::Duration::minutes(self.slot_tolerance_minutes),
            present_tolerance: chrono::Duration::minutes(self.present_tolerance_minutes),
            finalize_delay: chrono::Duration::minutes(self.finalize_delay_minutes),
        }
    }
}
