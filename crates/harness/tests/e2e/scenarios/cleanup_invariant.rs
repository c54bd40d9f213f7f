//! Cleanup invariant: whatever fails, the identity is deleted exactly once.

use crate::helpers::assertions::{assert_cleaned_up_once, assert_failed_with};
use crate::helpers::fixture::Fixture;

use devicetest_control_plane::mock::MockOperation;
use devicetest_core::ScenarioKind;
use devicetest_harness::{PhaseOutcome, ScenarioVariant, Verdict};

#[tokio::test]
async fn test_e2e_cleanup_after_success() {
    // Given: a jobs run whose device completes the job
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);

    // When
    let (report, mock) = fixture.run(fixture.mock_with_succeeded_job(), &plan).await;

    // Then
    assert_eq!(report.verdict, Verdict::Passed, "{:?}", report.record);
    assert_cleaned_up_once(&mock, &plan.identity_name);
}

#[tokio::test]
async fn test_e2e_cleanup_after_provision_failure() {
    // Given: policy attachment is rejected after thing and certificate exist
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);
    let mock = fixture.mock().failing_on(MockOperation::AttachPolicy);

    // When
    let (report, mock) = fixture.run(mock, &plan).await;

    // Then: the partial identity is still removed
    assert_failed_with(&report.record.provision, "attach policy");
    assert_eq!(report.record.drive, PhaseOutcome::NotAttempted);
    assert_eq!(report.record.cleanup, PhaseOutcome::Passed);
    assert_cleaned_up_once(&mock, &plan.identity_name);
}

#[tokio::test]
async fn test_e2e_cleanup_after_certificate_attach_failure() {
    // Given: the certificate cannot be attached to the thing
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Shadow, ScenarioVariant::Standard);
    let mock = fixture.mock().failing_on(MockOperation::AttachThingPrincipal);

    // When
    let (report, mock) = fixture.run(mock, &plan).await;

    // Then: the unattached certificate and the thing are both gone
    assert_failed_with(&report.record.provision, "attach certificate");
    assert_cleaned_up_once(&mock, &plan.identity_name);
}

#[tokio::test]
async fn test_e2e_cleanup_after_drive_failure() {
    // Given: the device sample exits non-zero
    let fixture = Fixture::new();
    fixture.write_script(ScenarioKind::Jobs, ScenarioVariant::Standard, "exit 2", None);
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);

    // When
    let (report, mock) = fixture.run(fixture.mock_with_succeeded_job(), &plan).await;

    // Then
    assert_failed_with(&report.record.drive, "code 2");
    assert_eq!(report.record.verify, PhaseOutcome::NotAttempted);
    assert_cleaned_up_once(&mock, &plan.identity_name);
}

#[tokio::test]
async fn test_e2e_cleanup_after_verify_failure() {
    // Given: the device exits 0 but never ran the job
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);

    // When
    let (report, mock) = fixture.run(fixture.mock(), &plan).await;

    // Then
    assert_eq!(report.record.drive, PhaseOutcome::Passed);
    assert_failed_with(&report.record.verify, "missing field 'execution'");
    assert_cleaned_up_once(&mock, &plan.identity_name);
}

#[tokio::test]
async fn test_e2e_cleanup_after_missing_policy_secret() {
    // Given: the policy secret is absent, so nothing can be created
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);
    let mock = devicetest_control_plane::mock::MockControlPlane::new();

    // When
    let (report, mock) = fixture.run(mock, &plan).await;

    // Then: delete still runs and finds nothing
    assert_failed_with(&report.record.provision, "unavailable");
    assert_eq!(report.record.cleanup, PhaseOutcome::Passed);
    assert_eq!(mock.call_count(MockOperation::CreateThing), 0);
    assert_eq!(mock.call_count(MockOperation::ListThingPrincipals), 1);
    assert_eq!(report.verdict, Verdict::Failed);
}

#[tokio::test]
async fn test_e2e_local_credentials_removed_after_run() {
    // Given
    let fixture = Fixture::new();
    fixture.write_script(
        ScenarioKind::Shadow,
        ScenarioVariant::Standard,
        r#"test -s "$DEVICETEST_CERT_PATH" && test -s "$DEVICETEST_KEY_PATH""#,
        None,
    );
    let plan = fixture.plan(ScenarioKind::Shadow, ScenarioVariant::Standard);
    let mock = fixture
        .mock()
        .with_shadow(&plan.identity_name, None, crate::helpers::fixture::REPORTED_ON);

    // When
    let (report, _mock) = fixture.run(mock, &plan).await;

    // Then: the sample saw its credentials and they are gone afterwards
    assert_eq!(report.record.drive, PhaseOutcome::Passed);
    let (cert, key) = fixture.credential_paths(ScenarioKind::Shadow);
    assert!(!cert.exists());
    assert!(!key.exists());
}
