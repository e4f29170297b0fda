use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Upper bound for a single geocoding request.
pub const MAX_GEOCODING_TIMEOUT_SECS: u64 = 30;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub geocoding: GeocodingConfig,
    pub geocode_schedule: Option<String>,
    pub completion_webhook_url: Option<String>,
}

/// Settings for the forward-geocoding provider.
///
/// Built once at startup and handed to the client constructor.
#[derive(Debug, Clone)]
pub struct GeocodingConfig {
    pub api_token: String,
    pub base_url: String,
    pub country: String,
    pub timeout: Duration,
}

impl GeocodingConfig {
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_token = var("GEOCODING_API_TOKEN").context("GEOCODING_API_TOKEN must be set")?;
        if api_token.trim().is_empty() {
            anyhow::bail!("GEOCODING_API_TOKEN must not be empty");
        }

        let timeout_secs: u64 = var("GEOCODING_TIMEOUT_SECS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("GEOCODING_TIMEOUT_SECS must be a valid number")?;

        Ok(Self {
            api_token,
            base_url: var("GEOCODING_BASE_URL")
                .unwrap_or_else(|| "https://api.mapbox.com".to_string()),
            country: var("GEOCODING_COUNTRY").unwrap_or_else(|| "us".to_string()),
            timeout: clamp_timeout(timeout_secs),
        })
    }
}

fn clamp_timeout(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(1, MAX_GEOCODING_TIMEOUT_SECS))
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every entry point (server and each CLI command) goes through this,
    /// so a missing geocoding token is always fatal at startup.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            database_url: var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: var("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            geocoding: GeocodingConfig::from_vars(&var)?,
            geocode_schedule: var("GEOCODE_SCHEDULE"),
            completion_webhook_url: var("GEOCODE_COMPLETION_WEBHOOK_URL"),
        })
    }
}
