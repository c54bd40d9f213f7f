//! A panic inside the protected region does not skip CLEANUP.

use crate::helpers::assertions::{assert_cleaned_up_once, assert_failed_with};
use crate::helpers::fixture::Fixture;

use devicetest_control_plane::mock::MockOperation;
use devicetest_core::ScenarioKind;
use devicetest_harness::{PhaseOutcome, ScenarioVariant, Verdict};

#[tokio::test]
async fn test_e2e_panic_during_provision_is_contained() {
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);
    let mock = fixture.mock().panicking_on(MockOperation::AttachPolicy);

    let (report, mock) = fixture.run(mock, &plan).await;

    assert_failed_with(&report.record.provision, "panicked");
    assert_eq!(report.record.drive, PhaseOutcome::NotAttempted);
    assert_eq!(report.verdict, Verdict::Failed);
    assert_cleaned_up_once(&mock, &plan.identity_name);
}

#[tokio::test]
async fn test_e2e_panic_during_verify_keeps_earlier_outcomes() {
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Shadow, ScenarioVariant::Standard);
    let mock = fixture.mock().panicking_on(MockOperation::GetThingShadow);

    let (report, mock) = fixture.run(mock, &plan).await;

    assert_eq!(report.record.provision, PhaseOutcome::Passed);
    assert_eq!(report.record.drive, PhaseOutcome::Passed);
    assert_failed_with(&report.record.verify, "GetThingShadow");
    assert_cleaned_up_once(&mock, &plan.identity_name);
}

#[tokio::test]
async fn test_e2e_panic_during_cleanup_still_reports() {
    // Given: a passing run whose thing deletion panics
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);
    let mock = fixture
        .mock_with_succeeded_job()
        .panicking_on(MockOperation::DeleteThing);

    // When
    let (report, mock) = fixture.run(mock, &plan).await;

    // Then: the report survives and the leak is a failure
    assert_eq!(report.record.verify, PhaseOutcome::Passed);
    assert_failed_with(&report.record.cleanup, "panicked");
    assert_eq!(report.verdict, Verdict::Failed);
    assert!(
        report
            .summary_lines()
            .iter()
            .any(|l| l.starts_with("ERROR: cleanup failed"))
    );
    assert!(mock.thing_exists(&plan.identity_name));
}
