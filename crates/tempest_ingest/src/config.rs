//! Service configuration: optional YAML file plus environment overrides.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::redact::REDACTED;
use crate::rest::DEFAULT_REST_BASE_URL;
use crate::stream::{BackoffPolicy, StreamSettings, DEFAULT_STREAM_URL};

/// Environment variables that override file settings.
pub const ENV_TOKEN: &str = "TEMPEST_TOKEN";
pub const ENV_DEVICE_ID: &str = "TEMPEST_DEVICE_ID";
pub const ENV_STATION_ID: &str = "TEMPEST_STATION_ID";
pub const ENV_STATION_NAME: &str = "TEMPEST_STATION_NAME";

/// Root configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// API token, sent as a query parameter on both endpoints.
    #[serde(default)]
    pub token: String,

    /// Device id for `listen_start`. Must be numeric to subscribe, but that is
    /// only discovered at subscribe time.
    #[serde(default)]
    pub device_id: String,

    /// Station id for the REST fallback.
    #[serde(default)]
    pub station_id: String,

    #[serde(default = "default_station_name")]
    pub station_name: String,

    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Stream downtime before the REST fallback starts fetching.
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

fn default_station_name() -> String {
    "tempest".to_string()
}

fn default_stream_url() -> String {
    DEFAULT_STREAM_URL.to_string()
}

fn default_rest_base_url() -> String {
    DEFAULT_REST_BASE_URL.to_string()
}

// obs_st arrives roughly every 60s.
fn default_read_timeout() -> u64 {
    300
}

fn default_fallback_threshold() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_status_interval() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            device_id: String::new(),
            station_id: String::new(),
            station_name: default_station_name(),
            stream_url: default_stream_url(),
            rest_base_url: default_rest_base_url(),
            read_timeout_secs: default_read_timeout(),
            fallback_threshold_secs: default_fallback_threshold(),
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
            status_interval_secs: default_status_interval(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("token", &REDACTED)
            .field("device_id", &self.device_id)
            .field("station_id", &self.station_id)
            .field("station_name", &self.station_name)
            .field("stream_url", &self.stream_url)
            .field("rest_base_url", &self.rest_base_url)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("fallback_threshold_secs", &self.fallback_threshold_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("status_interval_secs", &self.status_interval_secs)
            .finish()
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load from an optional file, apply process environment, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override settings from `lookup`; empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fields: [(&str, &mut String); 4] = [
            (ENV_TOKEN, &mut self.token),
            (ENV_DEVICE_ID, &mut self.device_id),
            (ENV_STATION_ID, &mut self.station_id),
            (ENV_STATION_NAME, &mut self.station_name),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *field = value;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.is_empty() {
            return Err(ConfigError::Missing(ENV_TOKEN));
        }
        if self.device_id.is_empty() {
            return Err(ConfigError::Missing(ENV_DEVICE_ID));
        }
        if self.station_id.is_empty() {
            return Err(ConfigError::Missing(ENV_STATION_ID));
        }
        validate_station_name(&self.station_name)?;

        let intervals = [
            ("read_timeout_secs", self.read_timeout_secs),
            ("fallback_threshold_secs", self.fallback_threshold_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("status_interval_secs", self.status_interval_secs),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            url: self.stream_url.clone(),
            token: self.token.clone(),
            device_id: self.device_id.clone(),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn fallback_threshold(&self) -> Duration {
        Duration::from_secs(self.fallback_threshold_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}

/// Station name: non-empty, `[A-Za-z0-9_.-]` only.
pub fn validate_station_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Invalid {
            field: "station_name",
            reason: "must not be empty".to_string(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c))
    {
        return Err(ConfigError::Invalid {
            field: "station_name",
            reason: format!(
                "{:?} may only contain alphanumeric characters, underscores, hyphens, and dots",
                name
            ),
        });
    }
    Ok(())
}
