//! Runtime configuration, read from the environment.

use std::fmt;
use std::time::Duration;

/// Configuration failure.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    Missing(&'static str),
    /// A variable is set but unparseable.
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "required variable {var} is not set"),
            ConfigError::Invalid(var, value) => {
                write!(f, "variable {var} has invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

const DEVICE_MAC: &str = "DEVICE_MAC";
const SPOTIFY_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
const SPOTIFY_CLIENT_SECRET: &str = "SPOTIFY_CLIENT_SECRET";
const SPOTIFY_REFRESH_TOKEN: &str = "SPOTIFY_REFRESH_TOKEN";
const FADE_DURATION_SECS: &str = "FADE_DURATION_SECS";

const DEFAULT_FADE_DURATION: Duration = Duration::from_secs(1);

/// Everything the daemon needs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// BLE address of the light, e.g. `A4:C1:38:01:02:03`.
    pub device_mac: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_refresh_token: String,
    /// How long each color transition takes.
    pub fade_duration: Duration,
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`, so tests can inject variables
    /// without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| -> Result<String, ConfigError> {
            match lookup(var) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(ConfigError::Missing(var)),
            }
        };

        let fade_duration = match lookup(FADE_DURATION_SECS) {
            None => DEFAULT_FADE_DURATION,
            Some(raw) => match raw.parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
                _ => return Err(ConfigError::Invalid(FADE_DURATION_SECS, raw)),
            },
        };

        Ok(Config {
            device_mac: required(DEVICE_MAC)?,
            spotify_client_id: required(SPOTIFY_CLIENT_ID)?,
            spotify_client_secret: required(SPOTIFY_CLIENT_SECRET)?,
            spotify_refresh_token: required(SPOTIFY_REFRESH_TOKEN)?,
            fade_duration,
        })
    }
}
