//! Shadow scenario verification.

use crate::helpers::assertions::assert_failed_with;
use crate::helpers::fixture::{Fixture, REPORTED_ON};

use devicetest_core::ScenarioKind;
use devicetest_harness::{ScenarioVariant, Verdict};

#[tokio::test]
async fn test_e2e_shadow_reported_on_passes() {
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Shadow, ScenarioVariant::Standard);
    let mock = fixture.mock().with_shadow(&plan.identity_name, None, REPORTED_ON);

    let (report, _mock) = fixture.run(mock, &plan).await;

    assert_eq!(report.verdict, Verdict::Passed, "{:?}", report.record);
}

#[tokio::test]
async fn test_e2e_shadow_empty_reported_is_missing_field() {
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Shadow, ScenarioVariant::Standard);
    let mock = fixture
        .mock()
        .with_shadow(&plan.identity_name, None, br#"{"state":{"reported":{}}}"#.as_slice());

    let (report, _mock) = fixture.run(mock, &plan).await;

    assert_failed_with(&report.record.verify, "missing field 'state.reported.color'");
}

#[tokio::test]
async fn test_e2e_shadow_wrong_value_is_value_mismatch() {
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Shadow, ScenarioVariant::Standard);
    let mock = fixture.mock().with_shadow(
        &plan.identity_name,
        None,
        br#"{"state":{"reported":{"color":"off"}}}"#.as_slice(),
    );

    let (report, _mock) = fixture.run(mock, &plan).await;

    assert_failed_with(&report.record.verify, r#"is "off", expected "on""#);
}

#[tokio::test]
async fn test_e2e_named_shadow_checks_named_document() {
    // Given: only the named shadow carries the reported value
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Shadow, ScenarioVariant::NamedShadow);
    let mock = fixture
        .mock()
        .with_shadow(&plan.identity_name, Some("testShadow"), REPORTED_ON);

    let (report, _mock) = fixture.run(mock, &plan).await;

    assert_eq!(report.verdict, Verdict::Passed, "{:?}", report.record);
}

#[tokio::test]
async fn test_e2e_missing_shadow_is_resource_not_found() {
    let fixture = Fixture::new();
    let plan = fixture.plan(ScenarioKind::Shadow, ScenarioVariant::NamedShadow);

    let (report, _mock) = fixture.run(fixture.mock(), &plan).await;

    assert_failed_with(&report.record.verify, "resource not found");
}
