//! Device identity registry abstraction.
//!
//! The [`IdentityRegistry`] trait mirrors the individual control-plane calls
//! needed to build and tear down an ephemeral identity. Composition (order,
//! compensation, idempotency) lives in the harness's lifecycle manager, not
//! here, so every method is a single API call.
//!
//! ```text
//! ┌───────────────────┐
//! │ LifecycleManager  │
//! └─────────┬─────────┘
//!           ▼
//!   ┌────────────────┐
//!   │IdentityRegistry│ (trait)
//!   └────────────────┘
//!        │       │
//!        ▼       ▼
//!    ┌─────┐ ┌──────┐
//!    │ AWS │ │ Mock │
//!    └─────┘ └──────┘
//! ```

use std::future::Future;

use aws_sdk_iot::types::CertificateStatus;
use serde::{Deserialize, Serialize};

use crate::aws::sdk_error;
use crate::error::ControlPlaneError;

/// Credential material returned by key/certificate creation.
#[derive(Clone, Serialize, Deserialize)]
pub struct CertificateMaterial {
    pub certificate_arn: String,
    pub certificate_id: String,
    pub certificate_pem: String,
    pub private_key: String,
}

impl std::fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("certificate_arn", &self.certificate_arn)
            .field("certificate_id", &self.certificate_id)
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Subset of a thing description the harness looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingSummary {
    pub thing_name: String,
    pub thing_arn: Option<String>,
}

/// Extracts the certificate id from a certificate ARN
/// (`arn:aws:iot:<region>:<account>:cert/<id>`).
///
/// Returns `None` for principals that are not certificates.
pub fn certificate_id_from_arn(arn: &str) -> Option<&str> {
    arn.split_once(":cert/")
        .map(|(_, id)| id)
        .filter(|id| !id.is_empty())
}

/// Identity-related control-plane calls.
///
/// Methods addressing a thing return `ControlPlaneError::NotFound` when the
/// thing does not exist; callers that tolerate absence check
/// [`ControlPlaneError::is_not_found`].
pub trait IdentityRegistry: Send + Sync + 'static {
    /// Registers a thing named `thing_name`.
    fn create_thing(
        &self,
        thing_name: &str,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;

    /// Creates an active key pair and certificate.
    fn create_keys_and_certificate(
        &self,
    ) -> impl Future<Output = Result<CertificateMaterial, ControlPlaneError>> + Send;

    /// Attaches a principal (certificate ARN) to a thing.
    fn attach_thing_principal(
        &self,
        thing_name: &str,
        principal: &str,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;

    /// Attaches a named policy to a target (certificate ARN).
    fn attach_policy(
        &self,
        policy_name: &str,
        target: &str,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;

    /// Adds a thing to a thing group.
    fn add_thing_to_group(
        &self,
        thing_name: &str,
        group_name: &str,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;

    /// Describes a thing.
    fn describe_thing(
        &self,
        thing_name: &str,
    ) -> impl Future<Output = Result<ThingSummary, ControlPlaneError>> + Send;

    /// Lists principals (certificate ARNs) attached to a thing.
    fn list_thing_principals(
        &self,
        thing_name: &str,
    ) -> impl Future<Output = Result<Vec<String>, ControlPlaneError>> + Send;

    /// Detaches a principal from a thing.
    fn detach_thing_principal(
        &self,
        thing_name: &str,
        principal: &str,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;

    /// Marks a certificate inactive (required before deletion).
    fn deactivate_certificate(
        &self,
        certificate_id: &str,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;

    /// Deletes an inactive certificate, detaching any policies.
    fn delete_certificate(
        &self,
        certificate_id: &str,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;

    /// Deletes a thing. Fails while principals are still attached.
    fn delete_thing(
        &self,
        thing_name: &str,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;
}

/// AWS IoT Core registry.
pub struct AwsIdentityRegistry {
    client: aws_sdk_iot::Client,
}

impl AwsIdentityRegistry {
    pub fn new(client: aws_sdk_iot::Client) -> Self {
        Self { client }
    }
}

fn thing_resource(thing_name: &str) -> String {
    format!("thing '{thing_name}'")
}

impl IdentityRegistry for AwsIdentityRegistry {
    async fn create_thing(&self, thing_name: &str) -> Result<(), ControlPlaneError> {
        self.client
            .create_thing()
            .thing_name(thing_name)
            .send()
            .await
            .map_err(|e| sdk_error("CreateThing", &e))?;
        Ok(())
    }

    async fn create_keys_and_certificate(&self) -> Result<CertificateMaterial, ControlPlaneError> {
        const OP: &str = "CreateKeysAndCertificate";

        let output = self
            .client
            .create_keys_and_certificate()
            .set_as_active(true)
            .send()
            .await
            .map_err(|e| sdk_error(OP, &e))?;

        let missing = |field: &str| ControlPlaneError::InvalidResponse {
            operation: OP,
            reason: format!("missing {field}"),
        };

        Ok(CertificateMaterial {
            certificate_arn: output
                .certificate_arn()
                .ok_or_else(|| missing("certificateArn"))?
                .to_owned(),
            certificate_id: output
                .certificate_id()
                .ok_or_else(|| missing("certificateId"))?
                .to_owned(),
            certificate_pem: output
                .certificate_pem()
                .ok_or_else(|| missing("certificatePem"))?
                .to_owned(),
            private_key: output
                .key_pair()
                .and_then(|kp| kp.private_key())
                .ok_or_else(|| missing("keyPair.PrivateKey"))?
                .to_owned(),
        })
    }

    async fn attach_thing_principal(
        &self,
        thing_name: &str,
        principal: &str,
    ) -> Result<(), ControlPlaneError> {
        self.client
            .attach_thing_principal()
            .thing_name(thing_name)
            .principal(principal)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception())
                {
                    ControlPlaneError::not_found(thing_resource(thing_name))
                } else {
                    sdk_error("AttachThingPrincipal", &e)
                }
            })?;
        Ok(())
    }

    async fn attach_policy(&self, policy_name: &str, target: &str) -> Result<(), ControlPlaneError> {
        self.client
            .attach_policy()
            .policy_name(policy_name)
            .target(target)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception())
                {
                    ControlPlaneError::not_found(format!("policy '{policy_name}'"))
                } else {
                    sdk_error("AttachPolicy", &e)
                }
            })?;
        Ok(())
    }

    async fn add_thing_to_group(
        &self,
        thing_name: &str,
        group_name: &str,
    ) -> Result<(), ControlPlaneError> {
        self.client
            .add_thing_to_thing_group()
            .thing_name(thing_name)
            .thing_group_name(group_name)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception())
                {
                    ControlPlaneError::not_found(format!("thing group '{group_name}'"))
                } else {
                    sdk_error("AddThingToThingGroup", &e)
                }
            })?;
        Ok(())
    }

    async fn describe_thing(&self, thing_name: &str) -> Result<ThingSummary, ControlPlaneError> {
        let output = self
            .client
            .describe_thing()
            .thing_name(thing_name)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception())
                {
                    ControlPlaneError::not_found(thing_resource(thing_name))
                } else {
                    sdk_error("DescribeThing", &e)
                }
            })?;

        Ok(ThingSummary {
            thing_name: output.thing_name().unwrap_or(thing_name).to_owned(),
            thing_arn: output.thing_arn().map(str::to_owned),
        })
    }

    async fn list_thing_principals(&self, thing_name: &str) -> Result<Vec<String>, ControlPlaneError> {
        let mut principals = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_thing_principals()
                .thing_name(thing_name)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| {
                    if e.as_service_error()
                        .is_some_and(|se| se.is_resource_not_found_exception())
                    {
                        ControlPlaneError::not_found(thing_resource(thing_name))
                    } else {
                        sdk_error("ListThingPrincipals", &e)
                    }
                })?;

            principals.extend(output.principals().iter().cloned());

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_owned()),
                _ => break,
            }
        }

        Ok(principals)
    }

    async fn detach_thing_principal(
        &self,
        thing_name: &str,
        principal: &str,
    ) -> Result<(), ControlPlaneError> {
        self.client
            .detach_thing_principal()
            .thing_name(thing_name)
            .principal(principal)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception())
                {
                    ControlPlaneError::not_found(thing_resource(thing_name))
                } else {
                    sdk_error("DetachThingPrincipal", &e)
                }
            })?;
        Ok(())
    }

    async fn deactivate_certificate(&self, certificate_id: &str) -> Result<(), ControlPlaneError> {
        self.client
            .update_certificate()
            .certificate_id(certificate_id)
            .new_status(CertificateStatus::Inactive)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception())
                {
                    ControlPlaneError::not_found(format!("certificate '{certificate_id}'"))
                } else {
                    sdk_error("UpdateCertificate", &e)
                }
            })?;
        Ok(())
    }

    async fn delete_certificate(&self, certificate_id: &str) -> Result<(), ControlPlaneError> {
        self.client
            .delete_certificate()
            .certificate_id(certificate_id)
            .force_delete(true)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception())
                {
                    ControlPlaneError::not_found(format!("certificate '{certificate_id}'"))
                } else {
                    sdk_error("DeleteCertificate", &e)
                }
            })?;
        Ok(())
    }

    async fn delete_thing(&self, thing_name: &str) -> Result<(), ControlPlaneError> {
        self.client
            .delete_thing()
            .thing_name(thing_name)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception())
                {
                    ControlPlaneError::not_found(thing_resource(thing_name))
                } else {
                    sdk_error("DeleteThing", &e)
                }
            })?;
        Ok(())
    }
}
