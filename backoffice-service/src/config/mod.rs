//! Configuration module for backoffice-service.

use chrono_tz::Tz;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct BackofficeConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub venue: VenueConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Venue-level settings the scheduling core depends on. All planned and
/// actual times are entered as civil clock times in `timezone`; the booking
/// durations are operator-tunable, not constants.
#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub timezone: Tz,
    pub default_booking_minutes: i64,
    pub fixed_menu_booking_minutes: i64,
    pub minimum_booking_minutes: i64,
}

impl BackofficeConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "backoffice-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            venue: VenueConfig::from_env()?,
        })
    }
}

impl VenueConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let timezone = env::var("VENUE_TIMEZONE")
            .unwrap_or_else(|_| "Europe/London".to_string())
            .parse::<Tz>()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid VENUE_TIMEZONE: {}", e))
            })?;

        Ok(Self {
            timezone,
            default_booking_minutes: env::var("DEFAULT_BOOKING_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(90),
            fixed_menu_booking_minutes: env::var("FIXED_MENU_BOOKING_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120),
            minimum_booking_minutes: env::var("MINIMUM_BOOKING_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }
}
