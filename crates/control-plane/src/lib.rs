//! Control-plane capability interfaces for devicetest.
//!
//! The harness talks to the cloud only through three traits:
//!
//! - [`SecretStore`]: read named secrets
//! - [`IdentityRegistry`]: create and tear down things and certificates
//! - [`DeviceStateQuery`]: job execution and shadow lookups
//!
//! [`AwsControlPlane`] bundles the AWS IoT implementations. With the `mock`
//! feature, [`mock::MockControlPlane`] provides an in-memory implementation of
//! all three.

pub mod aws;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod query;
pub mod registry;
pub mod secrets;

pub use aws::AwsControlPlane;
pub use error::ControlPlaneError;
pub use query::{AwsDeviceStateQuery, DeviceStateQuery, JobExecutionRecord};
pub use registry::{
    AwsIdentityRegistry, CertificateMaterial, IdentityRegistry, ThingSummary,
    certificate_id_from_arn,
};
pub use secrets::{AwsSecretStore, SecretStore};
