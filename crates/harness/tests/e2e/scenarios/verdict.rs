//! Verdict aggregation across phases.

use crate::helpers::assertions::assert_failed_with;
use crate::helpers::fixture::Fixture;

use devicetest_control_plane::mock::MockOperation;
use devicetest_core::ScenarioKind;
use devicetest_harness::{PhaseOutcome, ScenarioVariant, Verdict};

#[tokio::test]
async fn test_e2e_all_phases_pass() {
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);

    let (report, _mock) = fixture.run(fixture.mock_with_succeeded_job(), &plan).await;

    assert_eq!(report.record.provision, PhaseOutcome::Passed);
    assert_eq!(report.record.drive, PhaseOutcome::Passed);
    assert_eq!(report.record.verify, PhaseOutcome::Passed);
    assert_eq!(report.record.cleanup, PhaseOutcome::Passed);
    assert_eq!(report.verdict, Verdict::Passed);
    assert_eq!(report.summary_lines(), vec!["all phases passed"]);
}

#[tokio::test]
async fn test_e2e_cleanup_failure_fails_passing_run() {
    // Given: everything passes but the thing cannot be deleted
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);
    let mock = fixture
        .mock_with_succeeded_job()
        .failing_on(MockOperation::DeleteThing);

    // When
    let (report, mock) = fixture.run(mock, &plan).await;

    // Then: the leaked identity does not go unnoticed
    assert_eq!(report.record.verify, PhaseOutcome::Passed);
    assert_failed_with(&report.record.cleanup, "delete thing");
    assert_eq!(report.verdict, Verdict::Failed);
    assert!(mock.thing_exists(&plan.identity_name));
}

#[tokio::test]
async fn test_e2e_summary_lists_every_failure() {
    // Given: the sample fails and cleanup fails too
    let fixture = Fixture::new();
    fixture.write_script(ScenarioKind::Jobs, ScenarioVariant::Standard, "exit 1", None);
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);
    let mock = fixture.mock().failing_on(MockOperation::DeleteThing);

    // When
    let (report, _mock) = fixture.run(mock, &plan).await;

    // Then
    let lines = report.summary_lines();
    assert!(lines.iter().any(|l| l.starts_with("ERROR: drive failed")));
    assert!(lines.iter().any(|l| l.starts_with("ERROR: cleanup failed")));
    assert_eq!(report.verdict, Verdict::Failed);
}

#[tokio::test]
async fn test_e2e_missing_descriptor_fails_drive() {
    // Given: a plan pointing at a descriptor that does not exist
    let fixture = Fixture::new();
    let mut plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);
    plan.scenario_path = fixture.dir.path().join("missing.json");

    // When
    let (report, mock) = fixture.run(fixture.mock_with_succeeded_job(), &plan).await;

    // Then
    assert_failed_with(&report.record.drive, "scenario descriptor");
    assert_eq!(report.record.verify, PhaseOutcome::NotAttempted);
    assert!(!mock.thing_exists(&plan.identity_name));
}

#[tokio::test]
async fn test_e2e_delete_of_absent_identity_succeeds() {
    use std::sync::Arc;

    use devicetest_control_plane::mock::MockControlPlane;
    use devicetest_harness::{DeleteOutcome, LifecycleManager, SecretResolver};

    // Given: an identity that was never created
    let mock = Arc::new(MockControlPlane::new());
    let lifecycle = LifecycleManager::new(Arc::clone(&mock), SecretResolver::new(Arc::clone(&mock)));

    // When: deleting it twice
    let first = lifecycle.delete("ServiceTest_Jobs_never-created").await;
    let second = lifecycle.delete("ServiceTest_Jobs_never-created").await;

    // Then
    assert_eq!(first.expect("absent identity"), DeleteOutcome::NotFound);
    assert_eq!(second.expect("still absent"), DeleteOutcome::NotFound);
}

#[tokio::test]
async fn test_e2e_distinct_runs_use_distinct_identities() {
    use devicetest_core::{MqttVersion, RunId};
    use devicetest_harness::{ScenarioPlan, ScenarioRequest};

    let fixture = Fixture::new();
    let mut names = std::collections::HashSet::new();
    for _ in 0..50 {
        let request = ScenarioRequest {
            kind: ScenarioKind::Shadow,
            mqtt_version: MqttVersion::V3,
            variant: ScenarioVariant::Standard,
            run_id: RunId::generate(),
            region: "us-east-1".to_owned(),
            scenario_file: None,
            thing_name_prefix: None,
        };
        let plan = ScenarioPlan::build(&fixture.config, &request).expect("plan");
        assert!(plan.identity_name.starts_with("ServiceTest_Shadow_"));
        assert!(names.insert(plan.identity_name), "identity name collided");
    }
}
