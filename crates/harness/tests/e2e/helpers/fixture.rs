//! Scenario fixture: scratch directory, descriptors, config and mock plane.

use std::path::PathBuf;
use std::sync::Arc;

use devicetest_control_plane::JobExecutionRecord;
use devicetest_control_plane::mock::MockControlPlane;
use devicetest_core::config::DeviceTestConfig;
use devicetest_core::{MqttVersion, RunId, ScenarioKind};
use devicetest_harness::{
    Orchestrator, RunReport, ScenarioPlan, ScenarioRequest, ScenarioVariant, scenario_file_name,
};

pub const RUN_ID: &str = "e2e-run-0001";
pub const JOB_ID: &str = "ci-job-42";
pub const REPORTED_ON: &[u8] = br#"{"state":{"reported":{"color":"on"}},"version":7}"#;

pub type MockOrchestrator = Orchestrator<MockControlPlane, MockControlPlane, MockControlPlane>;

/// Scratch workspace with one descriptor per scenario file.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: DeviceTestConfig,
}

impl Fixture {
    /// Every descriptor initially runs `exit 0`.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = DeviceTestConfig::default();
        config.driver.scenario_dir = dir.path().join("scenarios");
        config.driver.cleanup_timeout_secs = 5;
        config.jobs.certificate_path = dir.path().join("jobs/certificate.pem.crt");
        config.jobs.key_path = dir.path().join("jobs/private.pem.key");
        config.shadow.certificate_path = dir.path().join("shadow/certificate.pem.crt");
        config.shadow.key_path = dir.path().join("shadow/private.pem.key");
        config.fleet_provisioning.thing_name_prefix = "Fleet_".to_owned();
        std::fs::create_dir_all(&config.driver.scenario_dir).expect("scenario dir");

        let fixture = Self { dir, config };
        for (kind, variant) in [
            (ScenarioKind::FleetProvisioning, ScenarioVariant::Standard),
            (ScenarioKind::FleetProvisioning, ScenarioVariant::Csr),
            (ScenarioKind::Jobs, ScenarioVariant::Standard),
            (ScenarioKind::Shadow, ScenarioVariant::Standard),
            (ScenarioKind::Shadow, ScenarioVariant::NamedShadow),
        ] {
            fixture.write_script(kind, variant, "exit 0", None);
        }
        fixture
    }

    /// Replaces the MQTT5 descriptor of `(kind, variant)` with an `sh -c`
    /// one-liner.
    pub fn write_script(
        &self,
        kind: ScenarioKind,
        variant: ScenarioVariant,
        script: &str,
        timeout_secs: Option<u64>,
    ) {
        let file = scenario_file_name(kind, variant, MqttVersion::V5).expect("mapped scenario");
        let mut descriptor = serde_json::json!({
            "description": format!("e2e {kind} {variant}"),
            "command": "sh",
            "arguments": [{ "name": "-c" }, { "name": script }],
        });
        if let Some(secs) = timeout_secs {
            descriptor["timeout_secs"] = serde_json::json!(secs);
        }
        std::fs::write(
            self.config.driver.scenario_dir.join(file),
            descriptor.to_string(),
        )
        .expect("write descriptor");
    }

    pub fn plan(&self, kind: ScenarioKind, variant: ScenarioVariant) -> ScenarioPlan {
        let request = ScenarioRequest {
            kind,
            mqtt_version: MqttVersion::V5,
            variant,
            run_id: RunId::parse(RUN_ID).expect("run id"),
            region: "us-east-1".to_owned(),
            scenario_file: None,
            thing_name_prefix: None,
        };
        ScenarioPlan::build(&self.config, &request).expect("plan")
    }

    /// Mock plane holding every secret the default config refers to.
    pub fn mock(&self) -> MockControlPlane {
        MockControlPlane::new()
            .with_secret(&self.config.jobs.policy_secret, "CiJobsPolicy")
            .with_secret(&self.config.jobs.job_id_secret, JOB_ID)
            .with_secret(&self.config.shadow.policy_secret, "CiShadowPolicy")
    }

    /// Mock plane where the jobs device already completed its job.
    pub fn mock_with_succeeded_job(&self) -> MockControlPlane {
        let thing = self.identity(ScenarioKind::Jobs);
        self.mock()
            .with_job_execution(JOB_ID, &thing, JobExecutionRecord::with_status("SUCCEEDED"))
    }

    pub fn identity(&self, kind: ScenarioKind) -> String {
        self.plan(kind, ScenarioVariant::Standard).identity_name
    }

    pub fn credential_paths(&self, kind: ScenarioKind) -> (PathBuf, PathBuf) {
        match kind {
            ScenarioKind::Shadow => (
                self.config.shadow.certificate_path.clone(),
                self.config.shadow.key_path.clone(),
            ),
            _ => (
                self.config.jobs.certificate_path.clone(),
                self.config.jobs.key_path.clone(),
            ),
        }
    }

    /// Runs `plan` against `mock` and returns the report with the shared mock.
    pub async fn run(
        &self,
        mock: MockControlPlane,
        plan: &ScenarioPlan,
    ) -> (RunReport, Arc<MockControlPlane>) {
        let mock = Arc::new(mock);
        let orchestrator: MockOrchestrator = Orchestrator::new(
            Arc::clone(&mock),
            Arc::clone(&mock),
            Arc::clone(&mock),
            &self.config.driver,
        );
        let report = orchestrator.run(plan).await;
        (report, mock)
    }
}
