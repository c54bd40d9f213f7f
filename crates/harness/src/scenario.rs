//! Scenario plans -- what each scenario family provisions, drives and checks.
//!
//! A [`ScenarioPlan`] is built once from the configuration and the
//! command-line request, then handed to the orchestrator. The descriptor file
//! for a run comes from an explicit `(family, variant, MQTT version)` table
//! ([`scenario_file_name`]) unless the caller names a file directly.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use devicetest_core::config::DeviceTestConfig;
use devicetest_core::{ConfigError, MqttVersion, RunId, ScenarioKind};

use crate::driver::DriveContext;
use crate::lifecycle::PolicyRef;
use crate::verifier::Expectation;

/// Scenario sub-variant selected by command-line flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioVariant {
    Standard,
    /// Fleet provisioning with a certificate signing request.
    Csr,
    /// Shadow test against a named shadow.
    NamedShadow,
}

impl fmt::Display for ScenarioVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standard => "standard",
            Self::Csr => "csr",
            Self::NamedShadow => "named-shadow",
        })
    }
}

/// Descriptor file names per scenario.
const SCENARIO_FILES: &[(ScenarioKind, ScenarioVariant, MqttVersion, &str)] = &[
    (
        ScenarioKind::FleetProvisioning,
        ScenarioVariant::Standard,
        MqttVersion::V3,
        "mqtt3_fleet_provisioning_cfg.json",
    ),
    (
        ScenarioKind::FleetProvisioning,
        ScenarioVariant::Standard,
        MqttVersion::V5,
        "mqtt5_fleet_provisioning_cfg.json",
    ),
    (
        ScenarioKind::FleetProvisioning,
        ScenarioVariant::Csr,
        MqttVersion::V3,
        "mqtt3_fleet_provisioning_with_csr_cfg.json",
    ),
    (
        ScenarioKind::FleetProvisioning,
        ScenarioVariant::Csr,
        MqttVersion::V5,
        "mqtt5_fleet_provisioning_with_csr_cfg.json",
    ),
    (
        ScenarioKind::Jobs,
        ScenarioVariant::Standard,
        MqttVersion::V3,
        "mqtt3_jobs_cfg.json",
    ),
    (
        ScenarioKind::Jobs,
        ScenarioVariant::Standard,
        MqttVersion::V5,
        "mqtt5_jobs_cfg.json",
    ),
    (
        ScenarioKind::Shadow,
        ScenarioVariant::Standard,
        MqttVersion::V3,
        "mqtt3_shadow_cfg.json",
    ),
    (
        ScenarioKind::Shadow,
        ScenarioVariant::Standard,
        MqttVersion::V5,
        "mqtt5_shadow_cfg.json",
    ),
    (
        ScenarioKind::Shadow,
        ScenarioVariant::NamedShadow,
        MqttVersion::V3,
        "mqtt3_named_shadow_cfg.json",
    ),
    (
        ScenarioKind::Shadow,
        ScenarioVariant::NamedShadow,
        MqttVersion::V5,
        "mqtt5_named_shadow_cfg.json",
    ),
];

/// Returns the descriptor file name for a scenario.
///
/// # Errors
///
/// `ConfigError::InvalidValue` for variants the family does not have
/// (e.g. CSR for jobs).
pub fn scenario_file_name(
    kind: ScenarioKind,
    variant: ScenarioVariant,
    version: MqttVersion,
) -> Result<&'static str, ConfigError> {
    SCENARIO_FILES
        .iter()
        .find(|(k, v, m, _)| *k == kind && *v == variant && *m == version)
        .map(|(_, _, _, file)| *file)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: "variant".to_owned(),
            reason: format!("{kind} has no '{variant}' variant"),
        })
}

/// Command-line selection of a run.
#[derive(Debug, Clone)]
pub struct ScenarioRequest {
    pub kind: ScenarioKind,
    pub mqtt_version: MqttVersion,
    pub variant: ScenarioVariant,
    pub run_id: RunId,
    pub region: String,
    /// Explicit descriptor, bypassing the file table.
    pub scenario_file: Option<PathBuf>,
    /// Overrides the configured fleet provisioning thing-name prefix.
    pub thing_name_prefix: Option<String>,
}

/// Identity setup for scenarios that need one before driving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSpec {
    pub policy: PolicyRef,
    pub certificate_path: PathBuf,
    pub key_path: PathBuf,
    pub thing_group: Option<String>,
}

/// Everything the orchestrator needs for one run.
#[derive(Debug, Clone)]
pub struct ScenarioPlan {
    pub kind: ScenarioKind,
    pub run_id: RunId,
    pub identity_name: String,
    pub region: String,
    pub scenario_path: PathBuf,
    /// `None` when the scenario creates its own identity.
    pub provision: Option<ProvisionSpec>,
    pub expectation: Expectation,
}

impl ScenarioPlan {
    /// Builds the plan for `request`.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidValue` for an invalid variant, an identity name
    /// outside the thing-name rules, or credential paths that cannot be made
    /// absolute.
    pub fn build(config: &DeviceTestConfig, request: &ScenarioRequest) -> Result<Self, ConfigError> {
        let scenario_path = match &request.scenario_file {
            Some(file) => file.clone(),
            None => config.driver.scenario_dir.join(scenario_file_name(
                request.kind,
                request.variant,
                request.mqtt_version,
            )?),
        };

        let (prefix, provision, expectation) = match request.kind {
            ScenarioKind::FleetProvisioning => (
                request
                    .thing_name_prefix
                    .clone()
                    .unwrap_or_else(|| config.fleet_provisioning.thing_name_prefix.clone()),
                None,
                Expectation::ThingExists,
            ),
            ScenarioKind::Jobs => {
                let jobs = &config.jobs;
                (
                    jobs.thing_name_prefix.clone(),
                    Some(ProvisionSpec {
                        policy: PolicyRef::Secret(jobs.policy_secret.clone()),
                        certificate_path: absolute(&jobs.certificate_path, "jobs.certificate_path")?,
                        key_path: absolute(&jobs.key_path, "jobs.key_path")?,
                        thing_group: jobs.thing_group().map(str::to_owned),
                    }),
                    Expectation::JobSucceeded {
                        job_id_secret: jobs.job_id_secret.clone(),
                    },
                )
            }
            ScenarioKind::Shadow => {
                let shadow = &config.shadow;
                (
                    shadow.thing_name_prefix.clone(),
                    Some(ProvisionSpec {
                        policy: PolicyRef::Secret(shadow.policy_secret.clone()),
                        certificate_path: absolute(
                            &shadow.certificate_path,
                            "shadow.certificate_path",
                        )?,
                        key_path: absolute(&shadow.key_path, "shadow.key_path")?,
                        thing_group: shadow.thing_group().map(str::to_owned),
                    }),
                    Expectation::ShadowReported {
                        shadow_name: (request.variant == ScenarioVariant::NamedShadow)
                            .then(|| shadow.shadow_name.clone()),
                        property: shadow.property.clone(),
                        expected: shadow.expected_value.clone(),
                    },
                )
            }
        };

        Ok(Self {
            kind: request.kind,
            identity_name: request.run_id.identity_name(&prefix)?,
            run_id: request.run_id.clone(),
            region: request.region.clone(),
            scenario_path,
            provision,
            expectation,
        })
    }

    /// Values handed to the driven process.
    pub fn drive_context(&self) -> DriveContext {
        DriveContext {
            run_id: self.run_id.clone(),
            thing_name: self.identity_name.clone(),
            certificate_path: self.provision.as_ref().map(|p| p.certificate_path.clone()),
            key_path: self.provision.as_ref().map(|p| p.key_path.clone()),
            region: self.region.clone(),
        }
    }
}

fn absolute(path: &Path, field: &str) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|e| ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: format!("cannot resolve '{}': {e}", path.display()),
    })
}
