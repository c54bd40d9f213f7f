//! Control-plane adapter errors.
//!
//! Adapters only say *what* went wrong at the API boundary. The harness
//! decides what that means for a phase (a `NotFound` during delete is a
//! success, during verification it is a failure).

/// Error returned by every capability trait method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlPlaneError {
    /// The addressed resource does not exist.
    #[error("{resource} not found")]
    NotFound {
        /// Resource description, e.g. `thing 'ServiceTest_Jobs_1'`
        resource: String,
    },

    /// The control plane rejected the call or could not be reached.
    #[error("{operation} failed: {reason}")]
    Api {
        /// API operation name
        operation: &'static str,
        /// Error detail from the SDK
        reason: String,
    },

    /// The call succeeded but the response lacked a required part.
    #[error("invalid {operation} response: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },
}

impl ControlPlaneError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
