//! Harness configuration: `devicetest.toml` parsing and runtime settings.
//!
//! [`DeviceTestConfig`] holds every tunable of a run. Each scenario family
//! reads its own section.
//!
//! # Loading priority
//! 1. CLI flags (applied by the binary after loading)
//! 2. Environment variables (`DEVICETEST_DRIVER_TIMEOUT_SECS=900` form)
//! 3. Config file (`devicetest.toml`)
//! 4. Defaults (`Default` impls, matching the CI secrets and naming layout)
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), devicetest_core::error::DeviceTestError> {
//! use devicetest_core::config::DeviceTestConfig;
//!
//! // file + env overrides + validation
//! let config = DeviceTestConfig::load("devicetest.toml").await?;
//!
//! // straight from a TOML string
//! let config = DeviceTestConfig::parse("[driver]\ntimeout_secs = 900")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DeviceTestError};

/// Upper bounds for numeric settings.
const MAX_DRIVER_TIMEOUT_SECS: u64 = 7200;
const MAX_CLEANUP_TIMEOUT_SECS: u64 = 600;
const MAX_OUTPUT_TAIL_LINES: usize = 10_000;

/// Root of `devicetest.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceTestConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub fleet_provisioning: FleetProvisioningConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub shadow: ShadowConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl DeviceTestConfig {
    /// Loads a TOML file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DeviceTestError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise starts from defaults; environment
    /// overrides and validation are applied either way.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, DeviceTestError> {
        match path {
            Some(path) => Self::load(path).await,
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Loads a TOML file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DeviceTestError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeviceTestError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DeviceTestError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML string. Missing sections and fields take their defaults.
    pub fn parse(toml_str: &str) -> Result<Self, DeviceTestError> {
        toml::from_str(toml_str).map_err(|e| {
            DeviceTestError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Overrides values from environment variables.
    ///
    /// Naming: `DEVICETEST_{SECTION}_{FIELD}`, e.g. `DEVICETEST_JOBS_THING_GROUP`.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DEVICETEST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DEVICETEST_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.region, "DEVICETEST_GENERAL_REGION");

        // Driver
        override_path(&mut self.driver.scenario_dir, "DEVICETEST_DRIVER_SCENARIO_DIR");
        override_u64(&mut self.driver.timeout_secs, "DEVICETEST_DRIVER_TIMEOUT_SECS");
        override_u64(
            &mut self.driver.cleanup_timeout_secs,
            "DEVICETEST_DRIVER_CLEANUP_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.driver.output_tail_lines,
            "DEVICETEST_DRIVER_OUTPUT_TAIL_LINES",
        );

        // Fleet provisioning
        override_string(
            &mut self.fleet_provisioning.thing_name_prefix,
            "DEVICETEST_FLEET_PROVISIONING_THING_NAME_PREFIX",
        );

        // Jobs
        override_string(
            &mut self.jobs.thing_name_prefix,
            "DEVICETEST_JOBS_THING_NAME_PREFIX",
        );
        override_string(&mut self.jobs.policy_secret, "DEVICETEST_JOBS_POLICY_SECRET");
        override_string(&mut self.jobs.job_id_secret, "DEVICETEST_JOBS_JOB_ID_SECRET");
        override_string(&mut self.jobs.thing_group, "DEVICETEST_JOBS_THING_GROUP");
        override_path(
            &mut self.jobs.certificate_path,
            "DEVICETEST_JOBS_CERTIFICATE_PATH",
        );
        override_path(&mut self.jobs.key_path, "DEVICETEST_JOBS_KEY_PATH");

        // Shadow
        override_string(
            &mut self.shadow.thing_name_prefix,
            "DEVICETEST_SHADOW_THING_NAME_PREFIX",
        );
        override_string(
            &mut self.shadow.policy_secret,
            "DEVICETEST_SHADOW_POLICY_SECRET",
        );
        override_string(&mut self.shadow.thing_group, "DEVICETEST_SHADOW_THING_GROUP");
        override_string(&mut self.shadow.shadow_name, "DEVICETEST_SHADOW_SHADOW_NAME");
        override_string(&mut self.shadow.property, "DEVICETEST_SHADOW_PROPERTY");
        override_string(
            &mut self.shadow.expected_value,
            "DEVICETEST_SHADOW_EXPECTED_VALUE",
        );
        override_path(
            &mut self.shadow.certificate_path,
            "DEVICETEST_SHADOW_CERTIFICATE_PATH",
        );
        override_path(&mut self.shadow.key_path, "DEVICETEST_SHADOW_KEY_PATH");

        // Metrics
        override_bool(&mut self.metrics.enabled, "DEVICETEST_METRICS_ENABLED");
        override_path(&mut self.metrics.output_path, "DEVICETEST_METRICS_OUTPUT_PATH");
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), DeviceTestError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.general.region.trim().is_empty() {
            return Err(invalid("general.region", "must not be empty"));
        }

        if self.driver.timeout_secs == 0 || self.driver.timeout_secs > MAX_DRIVER_TIMEOUT_SECS {
            return Err(invalid(
                "driver.timeout_secs",
                format!("must be 1-{MAX_DRIVER_TIMEOUT_SECS}"),
            ));
        }

        if self.driver.cleanup_timeout_secs == 0
            || self.driver.cleanup_timeout_secs > MAX_CLEANUP_TIMEOUT_SECS
        {
            return Err(invalid(
                "driver.cleanup_timeout_secs",
                format!("must be 1-{MAX_CLEANUP_TIMEOUT_SECS}"),
            ));
        }

        if self.driver.output_tail_lines > MAX_OUTPUT_TAIL_LINES {
            return Err(invalid(
                "driver.output_tail_lines",
                format!("must be 0-{MAX_OUTPUT_TAIL_LINES}"),
            ));
        }

        if self.jobs.policy_secret.is_empty() {
            return Err(invalid("jobs.policy_secret", "must not be empty"));
        }
        if self.jobs.job_id_secret.is_empty() {
            return Err(invalid("jobs.job_id_secret", "must not be empty"));
        }
        validate_credential_paths("jobs", &self.jobs.certificate_path, &self.jobs.key_path)?;

        if self.shadow.policy_secret.is_empty() {
            return Err(invalid("shadow.policy_secret", "must not be empty"));
        }
        if self.shadow.property.is_empty() {
            return Err(invalid("shadow.property", "must not be empty"));
        }
        if self.shadow.shadow_name.is_empty() {
            return Err(invalid("shadow.shadow_name", "must not be empty"));
        }
        validate_credential_paths(
            "shadow",
            &self.shadow.certificate_path,
            &self.shadow.key_path,
        )?;

        if self.metrics.enabled && self.metrics.output_path.as_os_str().is_empty() {
            return Err(invalid(
                "metrics.output_path",
                "must not be empty when metrics are enabled",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> DeviceTestError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

fn validate_credential_paths(
    section: &str,
    certificate_path: &Path,
    key_path: &Path,
) -> Result<(), DeviceTestError> {
    if certificate_path.as_os_str().is_empty() {
        return Err(invalid(
            &format!("{section}.certificate_path"),
            "must not be empty",
        ));
    }
    if key_path.as_os_str().is_empty() {
        return Err(invalid(&format!("{section}.key_path"), "must not be empty"));
    }
    if certificate_path == key_path {
        return Err(invalid(
            &format!("{section}.key_path"),
            "must differ from certificate_path",
        ));
    }
    Ok(())
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
    /// Control-plane region
    pub region: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            region: "us-east-1".to_owned(),
        }
    }
}

/// Test driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Directory holding the scenario descriptors.
    pub scenario_dir: PathBuf,
    /// Default wall-clock budget for the driven process. A descriptor's own
    /// `timeout_secs` takes precedence.
    pub timeout_secs: u64,
    /// Separate budget for the cleanup phase.
    pub cleanup_timeout_secs: u64,
    /// Number of trailing output lines kept for diagnostics.
    pub output_tail_lines: usize,
}

impl DriverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            scenario_dir: PathBuf::from("scenarios"),
            timeout_secs: 600,
            cleanup_timeout_secs: 120,
            output_tail_lines: 200,
        }
    }
}

/// Fleet provisioning scenario settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetProvisioningConfig {
    /// Prefix the provisioning template puts in front of the run id.
    pub thing_name_prefix: String,
}

/// Jobs scenario settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub thing_name_prefix: String,
    /// Secret holding the policy name attached to the test certificate.
    pub policy_secret: String,
    /// Secret holding the id of the job the device must complete.
    pub job_id_secret: String,
    /// Thing group the job targets (empty: no group).
    pub thing_group: String,
    pub certificate_path: PathBuf,
    pub key_path: PathBuf,
}

impl JobsConfig {
    pub fn thing_group(&self) -> Option<&str> {
        non_empty(&self.thing_group)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            thing_name_prefix: "ServiceTest_Jobs_".to_owned(),
            policy_secret: "ci/JobsServiceClientTest/policy_name".to_owned(),
            job_id_secret: "ci/JobsServiceClientTest/job_id".to_owned(),
            thing_group: "CI_ServiceClient_Thing_Group".to_owned(),
            certificate_path: PathBuf::from(
                "servicetests/tests/jobs_execution/certificate.pem.crt",
            ),
            key_path: PathBuf::from("servicetests/tests/jobs_execution/private.pem.key"),
        }
    }
}

/// Shadow scenario settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub thing_name_prefix: String,
    pub policy_secret: String,
    /// Thing group for the identity (empty: no group).
    pub thing_group: String,
    /// Shadow name used when the named-shadow variant is selected.
    pub shadow_name: String,
    /// Key under `state.reported` the device must set.
    pub property: String,
    /// Value the device must report for `property`.
    pub expected_value: String,
    pub certificate_path: PathBuf,
    pub key_path: PathBuf,
}

impl ShadowConfig {
    pub fn thing_group(&self) -> Option<&str> {
        non_empty(&self.thing_group)
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            thing_name_prefix: "ServiceTest_Shadow_".to_owned(),
            policy_secret: "ci/ShadowServiceClientTest/policy_name".to_owned(),
            thing_group: String::new(),
            shadow_name: "testShadow".to_owned(),
            property: "color".to_owned(),
            expected_value: "on".to_owned(),
            certificate_path: PathBuf::from("certificate.pem.crt"),
            key_path: PathBuf::from("private.pem.key"),
        }
    }
}

/// Metrics export settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Record run metrics and write them out when the run ends.
    pub enabled: bool,
    /// Prometheus text exposition file written at the end of the run.
    pub output_path: PathBuf,
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

// --- env override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_path(target: &mut PathBuf, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = PathBuf::from(val);
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
