//! Jobs scenario verification.

use crate::helpers::assertions::assert_failed_with;
use crate::helpers::fixture::{Fixture, JOB_ID};

use devicetest_control_plane::JobExecutionRecord;
use devicetest_control_plane::mock::MockOperation;
use devicetest_core::ScenarioKind;
use devicetest_harness::{PhaseOutcome, ScenarioVariant, Verdict};

#[tokio::test]
async fn test_e2e_jobs_succeeded_passes() {
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);

    let (report, mock) = fixture.run(fixture.mock_with_succeeded_job(), &plan).await;

    assert_eq!(report.verdict, Verdict::Passed);
    // the identity joined the configured thing group while it existed
    assert_eq!(
        mock.targets_of(MockOperation::AddThingToGroup),
        vec![plan.identity_name.clone()]
    );
}

#[tokio::test]
async fn test_e2e_jobs_failed_status_is_value_mismatch() {
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);
    let mock = fixture.mock().with_job_execution(
        JOB_ID,
        &plan.identity_name,
        JobExecutionRecord::with_status("FAILED"),
    );

    let (report, _mock) = fixture.run(mock, &plan).await;

    assert_failed_with(&report.record.verify, "is FAILED, expected SUCCEEDED");
    assert_eq!(report.verdict, Verdict::Failed);
}

#[tokio::test]
async fn test_e2e_jobs_missing_execution_is_missing_field() {
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);

    let (report, _mock) = fixture.run(fixture.mock(), &plan).await;

    assert_failed_with(&report.record.verify, "missing field 'execution'");
}

#[tokio::test]
async fn test_e2e_jobs_sample_receives_run_values() {
    // Given: the sample asserts the thing name it was handed
    let fixture = Fixture::new();
    let identity = fixture.identity(ScenarioKind::Jobs);
    fixture.write_script(
        ScenarioKind::Jobs,
        ScenarioVariant::Standard,
        &format!(r#"test "$DEVICETEST_THING_NAME" = "{identity}" && test -n "$DEVICETEST_RUN_ID""#),
        None,
    );
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);

    let (report, _mock) = fixture.run(fixture.mock_with_succeeded_job(), &plan).await;

    assert_eq!(report.record.drive, PhaseOutcome::Passed);
}
