//! CLI-specific error types and exit code mapping

use devicetest_core::DeviceTestError;

/// Errors that end a run before or around the orchestrator.
///
/// Phase failures are not errors here: the orchestrator turns them into a
/// verdict. These are the ways the binary can fail to get that far.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading, validation or scenario selection failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Logging or metrics setup failed.
    #[error("initialization error: {0}")]
    Init(String),

    /// The control plane could not be reached before anything was created.
    #[error("control plane unavailable: {0}")]
    ControlPlane(String),

    /// IO error (metrics file write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DeviceTestError> for CliError {
    fn from(e: DeviceTestError) -> Self {
        match e {
            DeviceTestError::Io(io) => Self::Io(io),
            other => Self::Config(other.to_string()),
        }
    }
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                      |
    /// |------|----------------------------------------------|
    /// | 0    | Success                                      |
    /// | 1    | A phase failed, or the run could not proceed |
    /// | 2    | Configuration error                          |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Init(_) | Self::ControlPlane(_) | Self::Io(_) => 1,
        }
    }
}
