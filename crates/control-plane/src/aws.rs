//! Shared AWS SDK plumbing.
//!
//! All three adapters are built from one [`SdkConfig`](aws_config::SdkConfig)
//! so they share the credential chain and region.

use aws_config::{BehaviorVersion, Region, SdkConfig};

use crate::error::ControlPlaneError;
use crate::query::AwsDeviceStateQuery;
use crate::registry::AwsIdentityRegistry;
use crate::secrets::AwsSecretStore;

/// Endpoint type for the account's data-plane (shadow) endpoint.
const DATA_ENDPOINT_TYPE: &str = "iot:Data-ATS";

/// Loads the default credential/config chain pinned to `region`.
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_owned()))
        .load()
        .await
}

/// The three production adapters for one region.
pub struct AwsControlPlane {
    pub secrets: AwsSecretStore,
    pub registry: AwsIdentityRegistry,
    pub query: AwsDeviceStateQuery,
}

impl AwsControlPlane {
    /// Builds every adapter for `region`.
    ///
    /// The data-plane client needs the account-specific endpoint, so this
    /// performs one `DescribeEndpoint` call.
    ///
    /// # Errors
    ///
    /// Returns `ControlPlaneError::Api` when the endpoint lookup fails, which
    /// usually means no credentials could be sourced.
    pub async fn connect(region: &str) -> Result<Self, ControlPlaneError> {
        let sdk_config = load_sdk_config(region).await;
        let iot = aws_sdk_iot::Client::new(&sdk_config);

        let endpoint = iot
            .describe_endpoint()
            .endpoint_type(DATA_ENDPOINT_TYPE)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeEndpoint", &e))?;
        let address = endpoint
            .endpoint_address()
            .ok_or_else(|| ControlPlaneError::InvalidResponse {
                operation: "DescribeEndpoint",
                reason: "missing endpointAddress".to_owned(),
            })?;

        let data_config = aws_sdk_iotdataplane::config::Builder::from(&sdk_config)
            .endpoint_url(format!("https://{address}"))
            .build();
        let data = aws_sdk_iotdataplane::Client::from_conf(data_config);

        tracing::debug!(region, data_endpoint = address, "control plane clients ready");

        Ok(Self {
            secrets: AwsSecretStore::new(aws_sdk_secretsmanager::Client::new(&sdk_config)),
            registry: AwsIdentityRegistry::new(iot.clone()),
            query: AwsDeviceStateQuery::new(iot, data),
        })
    }
}

/// Converts an SDK error into [`ControlPlaneError::Api`] keeping the full
/// error chain in the reason.
pub(crate) fn sdk_error<E>(operation: &'static str, err: &E) -> ControlPlaneError
where
    E: std::error::Error,
{
    ControlPlaneError::Api {
        operation,
        reason: aws_sdk_iot::error::DisplayErrorContext(err).to_string(),
    }
}
