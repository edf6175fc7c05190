use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::descriptor::{parse_secret_spec, ConfigError, RetentionStrategy, SecretTarget};
use crate::rotation::DEFAULT_SECRET_LENGTH;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Targets as `NAME,NAMESPACE,KEY,STRATEGY[|...]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<String>,
    /// Targets as `[[targets]]` tables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<SecretTarget>,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_frequency")]
    pub frequency_minutes: i64,
    #[serde(default = "default_secret_length")]
    pub secret_length: usize,
    #[serde(default = "default_api_timeout")]
    pub api_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Longest accepted rotation interval: one year
pub const MAX_FREQUENCY_MINUTES: i64 = 365 * 24 * 60;

fn default_frequency() -> i64 {
    60
}

fn default_secret_length() -> usize {
    DEFAULT_SECRET_LENGTH
}

fn default_api_timeout() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            frequency_minutes: default_frequency(),
            secret_length: default_secret_length(),
            api_timeout_seconds: default_api_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Validated startup settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub targets: Vec<SecretTarget>,
    pub frequency_minutes: u64,
    pub secret_length: usize,
    pub api_timeout: Duration,
    pub port: u16,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Validate the configuration and resolve all targets.
    ///
    /// Targets from the specification string come first, followed by any
    /// `[[targets]]` tables.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let mut targets = match self.secrets.as_deref() {
            Some(spec) if !spec.trim().is_empty() => parse_secret_spec(spec)?,
            _ => Vec::new(),
        };
        for target in &self.targets {
            target.validate()?;
            targets.push(target.clone());
        }
        if targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let frequency = self.rotation.frequency_minutes;
        if frequency < 1 {
            return Err(ConfigError::Frequency(frequency));
        }
        if frequency > MAX_FREQUENCY_MINUTES {
            return Err(ConfigError::FrequencyTooLarge {
                value: frequency,
                max: MAX_FREQUENCY_MINUTES,
            });
        }
        if self.rotation.secret_length < 1 {
            return Err(ConfigError::NonPositive {
                name: "secret length",
                value: self.rotation.secret_length as u64,
            });
        }
        if self.rotation.api_timeout_seconds < 1 {
            return Err(ConfigError::NonPositive {
                name: "API timeout",
                value: self.rotation.api_timeout_seconds,
            });
        }

        Ok(Settings {
            targets,
            frequency_minutes: frequency as u64,
            secret_length: self.rotation.secret_length,
            api_timeout: Duration::from_secs(self.rotation.api_timeout_seconds),
            port: self.server.port,
        })
    }

    /// Create a sample configuration file
    pub fn create_sample<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample = Self {
            secrets: Some("db-credentials,default,password,retainPrev".to_string()),
            targets: vec![SecretTarget::new(
                "api-token",
                "default",
                "token",
                RetentionStrategy::None,
            )],
            rotation: RotationConfig::default(),
            server: ServerConfig::default(),
        };

        let toml_string =
            toml::to_string_pretty(&sample).context("Failed to serialize sample config")?;
        fs::write(path.as_ref(), toml_string)
            .with_context(|| format!("Failed to write sample config to {:?}", path.as_ref()))?;

        Ok(())
    }
}
