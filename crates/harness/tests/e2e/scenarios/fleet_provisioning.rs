//! Fleet provisioning: no PROVISION phase, the sample creates the identity.

use crate::helpers::assertions::assert_failed_with;
use crate::helpers::fixture::Fixture;

use devicetest_control_plane::mock::MockOperation;
use devicetest_core::ScenarioKind;
use devicetest_harness::{PhaseOutcome, ScenarioVariant, Verdict};

#[tokio::test]
async fn test_e2e_fleet_provisioned_thing_is_verified_and_deleted() {
    // Given: the sample's provisioning template created the thing
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::FleetProvisioning, ScenarioVariant::Standard);
    let mock = fixture.mock().with_thing(&plan.identity_name);

    // When
    let (report, mock) = fixture.run(mock, &plan).await;

    // Then
    assert_eq!(report.record.provision, PhaseOutcome::Skipped);
    assert_eq!(report.verdict, Verdict::Passed, "{:?}", report.record);
    assert_eq!(mock.call_count(MockOperation::CreateThing), 0);
    assert!(!mock.thing_exists(&plan.identity_name));
    assert_eq!(plan.identity_name, "Fleet_e2e-run-0001");
}

#[tokio::test]
async fn test_e2e_fleet_without_thing_fails_verification() {
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::FleetProvisioning, ScenarioVariant::Csr);

    let (report, _mock) = fixture.run(fixture.mock(), &plan).await;

    assert_failed_with(&report.record.verify, "resource not found");
    // nothing to delete is still a successful cleanup
    assert_eq!(report.record.cleanup, PhaseOutcome::Passed);
    assert_eq!(report.verdict, Verdict::Failed);
}

#[tokio::test]
async fn test_e2e_fleet_drive_failure_still_deletes_thing() {
    // Given: the sample created the thing, then failed
    let fixture = Fixture::new();
    fixture.write_script(
        ScenarioKind::FleetProvisioning,
        ScenarioVariant::Standard,
        "exit 1",
        None,
    );
    let plan = fixture.plan(ScenarioKind::FleetProvisioning, ScenarioVariant::Standard);
    let mock = fixture.mock().with_thing(&plan.identity_name);

    // When
    let (report, mock) = fixture.run(mock, &plan).await;

    // Then
    assert!(report.record.drive.is_failed());
    assert!(!mock.thing_exists(&plan.identity_name));
}
