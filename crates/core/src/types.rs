//! Domain types shared across the harness.
//!
//! - [`RunId`]: per-run correlation token embedded in every resource name
//! - [`MqttVersion`]: protocol version the driven sample is configured for
//! - [`ScenarioKind`]: the three scenario families

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Maximum length of a thing name accepted by the control plane.
pub const MAX_IDENTITY_NAME_LEN: usize = 128;

/// Returns true for characters allowed in thing names (`[A-Za-z0-9_:-]`).
fn is_identity_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':')
}

/// Correlation token for one orchestration run.
///
/// Either supplied by the caller (`--input-uuid`) or generated as a UUID v4.
/// The value is used verbatim as the suffix of the ephemeral identity name,
/// so it is restricted to the thing-name alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Generates a fresh random run identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wraps a caller-supplied identifier after validating it.
    pub fn parse(value: impl Into<String>) -> Result<Self, ConfigError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "input_uuid".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if value.len() > MAX_IDENTITY_NAME_LEN {
            return Err(ConfigError::InvalidValue {
                field: "input_uuid".to_owned(),
                reason: format!("length {} exceeds {MAX_IDENTITY_NAME_LEN}", value.len()),
            });
        }
        if !value.chars().all(is_identity_char) {
            return Err(ConfigError::InvalidValue {
                field: "input_uuid".to_owned(),
                reason: "may only contain ASCII letters, digits, '_', '-' and ':'".to_owned(),
            });
        }
        Ok(Self(value))
    }

    /// Uses the supplied identifier when present, otherwise generates one.
    pub fn from_option(value: Option<String>) -> Result<Self, ConfigError> {
        match value {
            Some(value) => Self::parse(value),
            None => Ok(Self::generate()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds the ephemeral identity name `<prefix><run id>`.
    ///
    /// Distinct run identifiers always yield distinct names under the same
    /// prefix, since the run id is the whole suffix.
    pub fn identity_name(&self, prefix: &str) -> Result<String, ConfigError> {
        if !prefix.chars().all(is_identity_char) {
            return Err(ConfigError::InvalidValue {
                field: "thing_name_prefix".to_owned(),
                reason: format!("'{prefix}' contains characters not allowed in thing names"),
            });
        }
        let name = format!("{prefix}{}", self.0);
        if name.len() > MAX_IDENTITY_NAME_LEN {
            return Err(ConfigError::InvalidValue {
                field: "thing_name_prefix".to_owned(),
                reason: format!(
                    "identity name '{name}' exceeds {MAX_IDENTITY_NAME_LEN} characters"
                ),
            });
        }
        Ok(name)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RunId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

/// MQTT protocol version selector for the driven sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MqttVersion {
    #[serde(rename = "3")]
    V3,
    #[serde(rename = "5")]
    V5,
}

impl MqttVersion {
    /// Numeric protocol version as passed to the driven process.
    pub fn number(self) -> u8 {
        match self {
            Self::V3 => 3,
            Self::V5 => 5,
        }
    }
}

impl fmt::Display for MqttVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl FromStr for MqttVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "3" => Ok(Self::V3),
            "5" => Ok(Self::V5),
            other => Err(ConfigError::InvalidValue {
                field: "mqtt_version".to_owned(),
                reason: format!("'{other}' is not one of: 3, 5"),
            }),
        }
    }
}

/// Scenario family under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// The driven sample provisions its own identity through a template.
    FleetProvisioning,
    /// The driven sample executes a pending job.
    Jobs,
    /// The driven sample updates a device shadow.
    Shadow,
}

impl ScenarioKind {
    /// Fixed label for logs and metric tags.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FleetProvisioning => "fleet-provisioning",
            Self::Jobs => "jobs",
            Self::Shadow => "shadow",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
