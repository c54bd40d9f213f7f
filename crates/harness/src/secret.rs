//! Secret resolution.

use std::sync::Arc;

use tracing::{debug, warn};

use devicetest_control_plane::SecretStore;
use devicetest_core::DeviceTestError;

/// Resolves logical secret names through a [`SecretStore`].
///
/// Lookups are never retried: a missing or unreadable secret is a setup
/// problem, not a transient one. Secret values are never logged.
pub struct SecretResolver<S: SecretStore> {
    store: Arc<S>,
}

impl<S: SecretStore> Clone for SecretResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SecretStore> SecretResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the current value of secret `name`.
    ///
    /// # Errors
    ///
    /// `DeviceTestError::SecretUnavailable` when the store is unreachable, the
    /// secret does not exist or it has no string value.
    pub async fn resolve(&self, name: &str) -> Result<String, DeviceTestError> {
        match self.store.get_secret(name).await {
            Ok(value) => {
                debug!(secret = name, "secret resolved");
                Ok(value)
            }
            Err(e) => {
                warn!(secret = name, error = %e, "secret unavailable");
                Err(DeviceTestError::SecretUnavailable {
                    name: name.to_owned(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
