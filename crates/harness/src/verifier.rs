//! Post-run verification of the scenario's observable side effect.
//!
//! The predicates ([`check_job_execution`], [`check_shadow_document`]) are
//! pure functions over the query responses; [`ScenarioVerifier`] only fetches
//! the data and maps control-plane errors. Nothing here is retried: the driven
//! process has already reported completion, so the state is expected to be
//! final.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use devicetest_control_plane::{
    ControlPlaneError, DeviceStateQuery, IdentityRegistry, JobExecutionRecord, SecretStore,
};
use devicetest_core::{DeviceTestError, VerificationFailure};

use crate::secret::SecretResolver;

/// Terminal job execution status that counts as success.
pub const JOB_SUCCEEDED: &str = "SUCCEEDED";

/// What a scenario must have produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// The identity exists in the registry.
    ThingExists,
    /// The job whose id is stored in `job_id_secret` succeeded on the thing.
    JobSucceeded { job_id_secret: String },
    /// `state.reported.<property>` of the (optionally named) shadow equals
    /// `expected`.
    ShadowReported {
        shadow_name: Option<String>,
        property: String,
        expected: String,
    },
}

impl Expectation {
    /// Fixed label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ThingExists => "thing-exists",
            Self::JobSucceeded { .. } => "job-succeeded",
            Self::ShadowReported { .. } => "shadow-reported",
        }
    }
}

/// Checks a job execution record.
pub fn check_job_execution(record: Option<&JobExecutionRecord>) -> Result<(), VerificationFailure> {
    let record = record.ok_or_else(|| VerificationFailure::MissingField {
        path: "execution".to_owned(),
    })?;
    let status = record
        .status
        .as_deref()
        .ok_or_else(|| VerificationFailure::MissingField {
            path: "execution.status".to_owned(),
        })?;

    if status == JOB_SUCCEEDED {
        Ok(())
    } else {
        Err(VerificationFailure::ValueMismatch {
            path: "execution.status".to_owned(),
            expected: JOB_SUCCEEDED.to_owned(),
            actual: status.to_owned(),
        })
    }
}

/// Checks that `state.reported.<property>` of a shadow document equals
/// `expected`.
///
/// A key missing at any level yields `MissingField` with the path up to that
/// key. Non-string values are compared by their JSON text.
pub fn check_shadow_document(
    payload: &[u8],
    property: &str,
    expected: &str,
) -> Result<(), VerificationFailure> {
    let document: Value = serde_json::from_slice(payload)
        .map_err(|e| VerificationFailure::QueryError(format!("undecodable shadow document: {e}")))?;

    let mut current = &document;
    let mut path = String::new();
    for key in ["state", "reported", property] {
        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(key);
        current = current
            .get(key)
            .ok_or_else(|| VerificationFailure::MissingField { path: path.clone() })?;
    }

    let matches = match current {
        Value::String(actual) => actual == expected,
        other => other.to_string() == expected,
    };
    if matches {
        Ok(())
    } else {
        Err(VerificationFailure::ValueMismatch {
            path,
            expected: Value::String(expected.to_owned()).to_string(),
            actual: current.to_string(),
        })
    }
}

/// Runs an [`Expectation`] against the control plane.
pub struct ScenarioVerifier<Q: DeviceStateQuery, R: IdentityRegistry, S: SecretStore> {
    query: Arc<Q>,
    registry: Arc<R>,
    secrets: SecretResolver<S>,
}

impl<Q, R, S> ScenarioVerifier<Q, R, S>
where
    Q: DeviceStateQuery,
    R: IdentityRegistry,
    S: SecretStore,
{
    pub fn new(query: Arc<Q>, registry: Arc<R>, secrets: SecretResolver<S>) -> Self {
        Self {
            query,
            registry,
            secrets,
        }
    }

    /// Verifies `expectation` for `identity_name`.
    ///
    /// # Errors
    ///
    /// - `VerificationFailed`: the state differs or could not be queried
    /// - `SecretUnavailable`: an expected value could not be resolved
    pub async fn verify(
        &self,
        expectation: &Expectation,
        identity_name: &str,
    ) -> Result<(), DeviceTestError> {
        let result = match expectation {
            Expectation::ThingExists => self.verify_thing_exists(identity_name).await,
            Expectation::JobSucceeded { job_id_secret } => {
                let job_id = self.secrets.resolve(job_id_secret).await?;
                self.verify_job(&job_id, identity_name).await
            }
            Expectation::ShadowReported {
                shadow_name,
                property,
                expected,
            } => {
                self.verify_shadow(identity_name, shadow_name.as_deref(), property, expected)
                    .await
            }
        };

        match &result {
            Ok(()) => info!(
                identity = identity_name,
                expectation = expectation.kind(),
                "verification passed"
            ),
            Err(failure) => warn!(
                identity = identity_name,
                expectation = expectation.kind(),
                reason = failure.reason_label(),
                error = %failure,
                "verification failed"
            ),
        }
        result.map_err(DeviceTestError::from)
    }

    async fn verify_thing_exists(&self, identity_name: &str) -> Result<(), VerificationFailure> {
        self.registry
            .describe_thing(identity_name)
            .await
            .map(|_| ())
            .map_err(query_failure)
    }

    async fn verify_job(&self, job_id: &str, identity_name: &str) -> Result<(), VerificationFailure> {
        let record = self
            .query
            .describe_job_execution(job_id, identity_name)
            .await
            .map_err(query_failure)?;
        check_job_execution(record.as_ref())
    }

    async fn verify_shadow(
        &self,
        identity_name: &str,
        shadow_name: Option<&str>,
        property: &str,
        expected: &str,
    ) -> Result<(), VerificationFailure> {
        let payload = self
            .query
            .get_thing_shadow(identity_name, shadow_name)
            .await
            .map_err(query_failure)?;
        check_shadow_document(&payload, property, expected)
    }
}

fn query_failure(err: ControlPlaneError) -> VerificationFailure {
    match err {
        ControlPlaneError::NotFound { resource } => VerificationFailure::ResourceNotFound(resource),
        other => VerificationFailure::QueryError(other.to_string()),
    }
}
