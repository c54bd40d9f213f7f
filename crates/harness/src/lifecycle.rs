//! Ephemeral identity lifecycle -- create and tear down a test thing.
//!
//! [`LifecycleManager::create`] builds the identity step by step and
//! [`LifecycleManager::delete`] removes whatever is reachable from the thing
//! name. The manager never decides *whether* to delete: the orchestrator calls
//! `delete` unconditionally once the protected region ends, even after a
//! partial `create`.
//!
//! # Create sequence
//!
//! ```text
//! resolve policy -> create thing -> create keys + cert -> attach cert to thing
//!   -> attach policy to cert -> [add to group] -> write cert/key files
//! ```
//!
//! Only the certificate created before it is attached to the thing is cleaned
//! up here, because `delete` finds certificates through the thing's principals
//! and could not see it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use devicetest_control_plane::{
    CertificateMaterial, ControlPlaneError, IdentityRegistry, SecretStore,
    certificate_id_from_arn,
};
use devicetest_core::DeviceTestError;
use devicetest_core::metrics as m;

use crate::secret::SecretResolver;

/// Where the policy attached to the certificate comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRef {
    /// Literal policy name.
    Name(String),
    /// Secret whose value is the policy name.
    Secret(String),
}

/// A fully provisioned identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityHandle {
    pub name: String,
    pub certificate_arn: String,
    pub certificate_id: String,
    pub certificate_path: PathBuf,
    pub key_path: PathBuf,
    pub thing_group: Option<String>,
}

/// Result of a successful [`LifecycleManager::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The thing existed and was removed together with its certificates.
    Deleted,
    /// No thing with that name exists.
    NotFound,
}

/// Creates and deletes ephemeral identities.
pub struct LifecycleManager<R: IdentityRegistry, S: SecretStore> {
    registry: Arc<R>,
    secrets: SecretResolver<S>,
}

impl<R: IdentityRegistry, S: SecretStore> LifecycleManager<R, S> {
    pub fn new(registry: Arc<R>, secrets: SecretResolver<S>) -> Self {
        Self { registry, secrets }
    }

    /// Provisions `identity_name` and writes its credentials.
    ///
    /// # Errors
    ///
    /// - `SecretUnavailable`: the policy secret could not be read (nothing
    ///   has been created yet)
    /// - `ProvisioningFailed`: any control-plane step or credential write
    ///   failed; the thing may exist and must still be deleted
    pub async fn create(
        &self,
        identity_name: &str,
        policy: &PolicyRef,
        certificate_path: &Path,
        key_path: &Path,
        thing_group: Option<&str>,
    ) -> Result<IdentityHandle, DeviceTestError> {
        let policy_name = match policy {
            PolicyRef::Name(name) => name.clone(),
            PolicyRef::Secret(secret) => self.secrets.resolve(secret).await?,
        };

        let failed = |step: &str, reason: &dyn std::fmt::Display| {
            DeviceTestError::ProvisioningFailed {
                identity: identity_name.to_owned(),
                reason: format!("{step}: {reason}"),
            }
        };

        info!(identity = identity_name, "creating thing");
        self.registry
            .create_thing(identity_name)
            .await
            .map_err(|e| failed("create thing", &e))?;
        metrics::counter!(m::IDENTITIES_CREATED_TOTAL).increment(1);

        let material = self
            .registry
            .create_keys_and_certificate()
            .await
            .map_err(|e| failed("create keys and certificate", &e))?;
        debug!(
            identity = identity_name,
            certificate_id = material.certificate_id.as_str(),
            "certificate created"
        );

        if let Err(e) = self
            .registry
            .attach_thing_principal(identity_name, &material.certificate_arn)
            .await
        {
            self.discard_orphan_certificate(identity_name, &material.certificate_id)
                .await;
            return Err(failed("attach certificate to thing", &e));
        }

        self.registry
            .attach_policy(&policy_name, &material.certificate_arn)
            .await
            .map_err(|e| failed("attach policy", &e))?;

        if let Some(group) = thing_group {
            self.registry
                .add_thing_to_group(identity_name, group)
                .await
                .map_err(|e| failed("add thing to group", &e))?;
        }

        write_credentials(&material, certificate_path, key_path)
            .await
            .map_err(|e| failed("write credentials", &e))?;

        info!(
            identity = identity_name,
            policy = policy_name.as_str(),
            group = thing_group.unwrap_or(""),
            certificate_path = %certificate_path.display(),
            "identity provisioned"
        );

        Ok(IdentityHandle {
            name: identity_name.to_owned(),
            certificate_arn: material.certificate_arn,
            certificate_id: material.certificate_id,
            certificate_path: certificate_path.to_path_buf(),
            key_path: key_path.to_path_buf(),
            thing_group: thing_group.map(str::to_owned),
        })
    }

    /// Removes `identity_name` with every certificate attached to it.
    ///
    /// Principal errors do not stop the teardown; the thing deletion is
    /// still attempted and all errors are reported together.
    ///
    /// # Errors
    ///
    /// `CleanupFailed` when any step other than a not-found failed.
    pub async fn delete(&self, identity_name: &str) -> Result<DeleteOutcome, DeviceTestError> {
        let cleanup_failed = |reason: String| DeviceTestError::CleanupFailed {
            identity: identity_name.to_owned(),
            reason,
        };

        let principals = match self.registry.list_thing_principals(identity_name).await {
            Ok(principals) => principals,
            Err(e) if e.is_not_found() => {
                info!(identity = identity_name, "thing not found, nothing to delete");
                return Ok(DeleteOutcome::NotFound);
            }
            Err(e) => return Err(cleanup_failed(format!("list principals: {e}"))),
        };

        let mut errors = Vec::new();
        for principal in &principals {
            if let Err(e) = self.remove_principal(identity_name, principal).await {
                warn!(
                    identity = identity_name,
                    principal = principal.as_str(),
                    error = %e,
                    "failed to remove principal"
                );
                errors.push(format!("{principal}: {e}"));
            }
        }

        let thing_deleted = match self.registry.delete_thing(identity_name).await {
            Ok(()) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                errors.push(format!("delete thing: {e}"));
                false
            }
        };

        if !errors.is_empty() {
            return Err(cleanup_failed(format!(
                "{} step(s) failed: {}",
                errors.len(),
                errors.join("; ")
            )));
        }

        if !thing_deleted {
            return Ok(DeleteOutcome::NotFound);
        }

        metrics::counter!(m::IDENTITIES_DELETED_TOTAL).increment(1);
        info!(
            identity = identity_name,
            principals = principals.len(),
            "identity deleted"
        );
        Ok(DeleteOutcome::Deleted)
    }

    /// Deletes the local certificate and key files written by `create`.
    ///
    /// Takes the paths rather than an [`IdentityHandle`] so files left by a
    /// partial `create` are removed too. Best effort: failures are logged
    /// and otherwise ignored.
    pub async fn remove_credentials(&self, certificate_path: &Path, key_path: &Path) {
        for path in [certificate_path, key_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "credential file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to remove credential file"
                ),
            }
        }
    }

    /// Detaches one principal and, for certificates, deactivates and deletes it.
    async fn remove_principal(
        &self,
        identity_name: &str,
        principal: &str,
    ) -> Result<(), ControlPlaneError> {
        ignore_not_found(
            self.registry
                .detach_thing_principal(identity_name, principal)
                .await,
        )?;

        let Some(certificate_id) = certificate_id_from_arn(principal) else {
            debug!(principal, "principal is not a certificate, detached only");
            return Ok(());
        };

        ignore_not_found(self.registry.deactivate_certificate(certificate_id).await)?;
        ignore_not_found(self.registry.delete_certificate(certificate_id).await)?;
        debug!(identity = identity_name, certificate_id, "certificate deleted");
        Ok(())
    }

    async fn discard_orphan_certificate(&self, identity_name: &str, certificate_id: &str) {
        let result = async {
            self.registry.deactivate_certificate(certificate_id).await?;
            self.registry.delete_certificate(certificate_id).await
        }
        .await;

        match result {
            Ok(()) => info!(
                identity = identity_name,
                certificate_id, "unattached certificate deleted"
            ),
            Err(e) => warn!(
                identity = identity_name,
                certificate_id,
                error = %e,
                "failed to delete unattached certificate"
            ),
        }
    }
}

fn ignore_not_found(result: Result<(), ControlPlaneError>) -> Result<(), ControlPlaneError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

async fn write_credentials(
    material: &CertificateMaterial,
    certificate_path: &Path,
    key_path: &Path,
) -> std::io::Result<()> {
    for path in [certificate_path, key_path] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    tokio::fs::write(certificate_path, &material.certificate_pem).await?;
    tokio::fs::write(key_path, &material.private_key).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(())
}
