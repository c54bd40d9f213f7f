//! Secret store abstraction.
//!
//! The [`SecretStore`] trait is the only way the harness reads sensitive
//! values (policy names, expected job ids, sample endpoints).
//! [`AwsSecretStore`] reads them from AWS Secrets Manager.

use std::future::Future;

use crate::aws::sdk_error;
use crate::error::ControlPlaneError;

/// Read access to named secrets.
pub trait SecretStore: Send + Sync + 'static {
    /// Returns the string value of secret `name`.
    ///
    /// # Errors
    ///
    /// - `ControlPlaneError::NotFound`: no secret with that name
    /// - `ControlPlaneError::InvalidResponse`: the secret has no string value
    /// - `ControlPlaneError::Api`: store unreachable or access denied
    fn get_secret(&self, name: &str)
    -> impl Future<Output = Result<String, ControlPlaneError>> + Send;
}

/// Secrets Manager backed store.
pub struct AwsSecretStore {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretStore {
    pub fn new(client: aws_sdk_secretsmanager::Client) -> Self {
        Self { client }
    }
}

impl SecretStore for AwsSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, ControlPlaneError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception());
                if not_found {
                    ControlPlaneError::not_found(format!("secret '{name}'"))
                } else {
                    sdk_error("GetSecretValue", &e)
                }
            })?;

        output
            .secret_string()
            .map(str::to_owned)
            .ok_or_else(|| ControlPlaneError::InvalidResponse {
                operation: "GetSecretValue",
                reason: format!("secret '{name}' has no string value"),
            })
    }
}
