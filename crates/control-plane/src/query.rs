//! Read-only device state queries used for post-hoc verification.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::aws::sdk_error;
use crate::error::ControlPlaneError;

/// Job execution record for one (job, thing) pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobExecutionRecord {
    /// Execution status as reported by the control plane, e.g. `SUCCEEDED`.
    pub status: Option<String>,
    pub execution_number: Option<i64>,
}

impl JobExecutionRecord {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            execution_number: Some(1),
        }
    }
}

/// Queries against the control plane and its data plane.
pub trait DeviceStateQuery: Send + Sync + 'static {
    /// Describes the execution of `job_id` on `thing_name`.
    ///
    /// Returns `Ok(None)` when the control plane knows no such execution.
    fn describe_job_execution(
        &self,
        job_id: &str,
        thing_name: &str,
    ) -> impl Future<Output = Result<Option<JobExecutionRecord>, ControlPlaneError>> + Send;

    /// Fetches the raw shadow document of `thing_name`.
    ///
    /// `shadow_name` selects a named shadow; `None` is the classic shadow.
    /// A missing shadow is `ControlPlaneError::NotFound`.
    fn get_thing_shadow(
        &self,
        thing_name: &str,
        shadow_name: Option<&str>,
    ) -> impl Future<Output = Result<Vec<u8>, ControlPlaneError>> + Send;
}

/// AWS IoT implementation (job executions via the control plane, shadows via
/// the account's data endpoint).
pub struct AwsDeviceStateQuery {
    iot: aws_sdk_iot::Client,
    data: aws_sdk_iotdataplane::Client,
}

impl AwsDeviceStateQuery {
    pub fn new(iot: aws_sdk_iot::Client, data: aws_sdk_iotdataplane::Client) -> Self {
        Self { iot, data }
    }
}

impl DeviceStateQuery for AwsDeviceStateQuery {
    async fn describe_job_execution(
        &self,
        job_id: &str,
        thing_name: &str,
    ) -> Result<Option<JobExecutionRecord>, ControlPlaneError> {
        let result = self
            .iot
            .describe_job_execution()
            .job_id(job_id)
            .thing_name(thing_name)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(sdk_error("DescribeJobExecution", &e)),
        };

        Ok(output.execution().map(|execution| JobExecutionRecord {
            status: execution.status().map(|s| s.as_str().to_owned()),
            execution_number: execution.execution_number(),
        }))
    }

    async fn get_thing_shadow(
        &self,
        thing_name: &str,
        shadow_name: Option<&str>,
    ) -> Result<Vec<u8>, ControlPlaneError> {
        let output = self
            .data
            .get_thing_shadow()
            .thing_name(thing_name)
            .set_shadow_name(shadow_name.map(str::to_owned))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception())
                {
                    let shadow = shadow_name.unwrap_or("classic");
                    ControlPlaneError::not_found(format!(
                        "{shadow} shadow of thing '{thing_name}'"
                    ))
                } else {
                    sdk_error("GetThingShadow", &e)
                }
            })?;

        output
            .payload()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| ControlPlaneError::InvalidResponse {
                operation: "GetThingShadow",
                reason: "empty payload".to_owned(),
            })
    }
}
