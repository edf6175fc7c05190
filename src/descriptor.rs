//! Secret target descriptors
//!
//! A descriptor names one key inside one Kubernetes Secret that the rotator
//! regenerates on every pass. Descriptors are parsed once at startup from a
//! specification string of the form
//! `NAME,NAMESPACE,KEY,STRATEGY[|NAME,NAMESPACE,KEY,STRATEGY]...`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Separator between descriptors in a specification string
const DESCRIPTOR_SEPARATOR: char = '|';
/// Separator between fields of one descriptor
const FIELD_SEPARATOR: char = ',';
/// Number of fields every descriptor must carry
const FIELD_COUNT: usize = 4;

/// Strategy flag that enables retention of the previous value
const RETAIN_PREVIOUS_FLAG: &str = "retainPrev";

/// Suffix appended to a key to hold its previous value
pub const PREVIOUS_SUFFIX: &str = "_PREV";

/// Errors raised while building descriptors from configuration.
///
/// All of these are fatal: the rotator refuses to start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no secrets configured; expected NAME,NAMESPACE,KEY,STRATEGY[|NAME,NAMESPACE,KEY,STRATEGY]")]
    NoTargets,

    #[error("invalid secret specification `{entry}`: expected 4 comma-separated fields NAME,NAMESPACE,KEY,STRATEGY, found {found}")]
    FieldCount { entry: String, found: usize },

    #[error("invalid secret specification `{entry}`: {field} must not be empty")]
    EmptyField { entry: String, field: &'static str },

    #[error("rotation frequency must be a positive number of minutes, got {0}")]
    Frequency(i64),

    #[error("rotation frequency must be at most {max} minutes, got {value}")]
    FrequencyTooLarge { value: i64, max: i64 },

    #[error("{name} must be at least 1, got {value}")]
    NonPositive { name: &'static str, value: u64 },
}

/// Whether the outgoing value of a key is kept under `<key>_PREV`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RetentionStrategy {
    #[default]
    None,
    RetainPrevious,
}

impl RetentionStrategy {
    /// Map a configuration flag to a strategy.
    ///
    /// Only `retainPrev` enables retention; every other value means `None`.
    pub fn from_flag(flag: &str) -> Self {
        if flag.trim() == RETAIN_PREVIOUS_FLAG {
            RetentionStrategy::RetainPrevious
        } else {
            RetentionStrategy::None
        }
    }

    pub fn as_flag(&self) -> &'static str {
        match self {
            RetentionStrategy::None => "none",
            RetentionStrategy::RetainPrevious => RETAIN_PREVIOUS_FLAG,
        }
    }
}

impl From<String> for RetentionStrategy {
    fn from(value: String) -> Self {
        Self::from_flag(&value)
    }
}

impl From<RetentionStrategy> for String {
    fn from(value: RetentionStrategy) -> Self {
        value.as_flag().to_string()
    }
}

/// One secret key to rotate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretTarget {
    pub name: String,
    pub namespace: String,
    pub key: String,
    #[serde(default)]
    pub strategy: RetentionStrategy,
}

impl SecretTarget {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        key: impl Into<String>,
        strategy: RetentionStrategy,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            key: key.into(),
            strategy,
        }
    }

    /// Key that receives the previous value when retention is enabled
    pub fn previous_key(&self) -> String {
        format!("{}{}", self.key, PREVIOUS_SUFFIX)
    }

    pub fn retains_previous(&self) -> bool {
        self.strategy == RetentionStrategy::RetainPrevious
    }

    /// Check that name, namespace and key are all present
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("secret name", &self.name),
            ("namespace", &self.namespace),
            ("key", &self.key),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    entry: self.to_string(),
                    field,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for SecretTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}->{}", self.namespace, self.name, self.key)
    }
}

/// Parse a full specification string into descriptors
pub fn parse_secret_spec(spec: &str) -> Result<Vec<SecretTarget>, ConfigError> {
    if spec.trim().is_empty() {
        return Err(ConfigError::NoTargets);
    }

    spec.split(DESCRIPTOR_SEPARATOR)
        .map(parse_descriptor)
        .collect()
}

/// Parse a single `NAME,NAMESPACE,KEY,STRATEGY` entry
pub fn parse_descriptor(entry: &str) -> Result<SecretTarget, ConfigError> {
    let parts: Vec<&str> = entry.split(FIELD_SEPARATOR).map(str::trim).collect();
    if parts.len() != FIELD_COUNT {
        return Err(ConfigError::FieldCount {
            entry: entry.to_string(),
            found: parts.len(),
        });
    }

    let target = SecretTarget::new(
        parts[0],
        parts[1],
        parts[2],
        RetentionStrategy::from_flag(parts[3]),
    );

    // Report against the raw entry so the operator can find it in their config
    target.validate().map_err(|e| match e {
        ConfigError::EmptyField { field, .. } => ConfigError::EmptyField {
            entry: entry.to_string(),
            field,
        },
        other => other,
    })?;

    Ok(target)
}
