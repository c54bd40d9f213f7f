//! Error taxonomy shared by every devicetest crate.
//!
//! [`DeviceTestError`] covers every way a single scenario run can fail. Each
//! orchestrator phase converts its error into a phase outcome with the error's
//! `Display` text as the reason, so the messages below are what ends up in the
//! final diagnostic lines.

/// Top-level devicetest error.
#[derive(Debug, thiserror::Error)]
pub enum DeviceTestError {
    /// Configuration loading or validation failure.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A named secret could not be read from the secret store.
    #[error("secret '{name}' unavailable: {reason}")]
    SecretUnavailable { name: String, reason: String },

    /// The control plane rejected part of identity creation.
    #[error("provisioning of '{identity}' failed: {reason}")]
    ProvisioningFailed { identity: String, reason: String },

    /// The scenario descriptor is missing or malformed.
    #[error("scenario descriptor {path}: {reason}")]
    Scenario { path: String, reason: String },

    /// The driven process could not be started.
    #[error("failed to launch driven process: {reason}")]
    DriverLaunch { reason: String },

    /// The driven process exceeded its wall-clock budget and was killed.
    #[error("driven process timed out after {timeout_secs}s")]
    DriverTimeout { timeout_secs: u64 },

    /// The driven process exited unsuccessfully. `code` is `None` when it was
    /// terminated by a signal.
    #[error("driven process exited with {}", exit_code_text(.code))]
    DriverNonZeroExit { code: Option<i32> },

    /// The post-run control-plane check did not observe the expected state.
    #[error("verification failed: {0}")]
    VerificationFailed(#[from] VerificationFailure),

    /// Teardown of the ephemeral identity failed.
    #[error("cleanup of '{identity}' failed: {reason}")]
    CleanupFailed { identity: String, reason: String },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_code_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code (terminated by signal)".to_owned(),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Config file is not valid TOML for [`DeviceTestConfig`](crate::config::DeviceTestConfig).
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A value is out of range or malformed.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Why a post-run verification did not pass.
///
/// A missing key and a wrong value are kept apart so a failing CI log says
/// whether the device never reported anything or reported the wrong thing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationFailure {
    /// A key along the expected path is absent from the response.
    #[error("missing field '{path}'")]
    MissingField { path: String },

    /// The field exists but holds a different value.
    #[error("field '{path}' is {actual}, expected {expected}")]
    ValueMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// The resource the scenario should have produced does not exist.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The query itself failed or returned something undecodable.
    #[error("query error: {0}")]
    QueryError(String),
}

impl VerificationFailure {
    /// Short stable label used for metrics and summary lines.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing-field",
            Self::ValueMismatch { .. } => "value-mismatch",
            Self::ResourceNotFound(_) => "resource-not-found",
            Self::QueryError(_) => "query-error",
        }
    }
}
