//! Driver timeout handling.

use std::time::{Duration, Instant};

use crate::helpers::assertions::{assert_cleaned_up_once, assert_failed_with};
use crate::helpers::fixture::Fixture;

use devicetest_core::ScenarioKind;
use devicetest_harness::{PhaseOutcome, ScenarioVariant, Verdict};

#[tokio::test]
async fn test_e2e_timeout_kills_process_and_cleans_up() {
    // Given: a sample that would hang for a minute with a 1s budget
    let fixture = Fixture::new();
    let marker = fixture.dir.path().join("finished");
    fixture.write_script(
        ScenarioKind::Jobs,
        ScenarioVariant::Standard,
        &format!("sleep 60; touch {}", marker.display()),
        Some(1),
    );
    let plan = fixture.plan(ScenarioKind::Jobs, ScenarioVariant::Standard);

    // When
    let started = Instant::now();
    let (report, mock) = fixture.run(fixture.mock_with_succeeded_job(), &plan).await;

    // Then
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_failed_with(&report.record.drive, "timed out after 1s");
    assert_eq!(report.record.verify, PhaseOutcome::NotAttempted);
    assert_eq!(report.record.cleanup, PhaseOutcome::Passed);
    assert_eq!(report.verdict, Verdict::Failed);
    assert_cleaned_up_once(&mock, &plan.identity_name);
    assert!(!marker.exists(), "the timed out process must not finish");
}

#[tokio::test]
async fn test_e2e_output_tail_kept_on_failure() {
    let fixture = Fixture::new();
    fixture.write_script(
        ScenarioKind::Shadow,
        ScenarioVariant::Standard,
        "echo connecting; echo 'connection refused' >&2; exit 1",
        None,
    );
    let plan = fixture.plan(ScenarioKind::Shadow, ScenarioVariant::Standard);

    let (report, _mock) = fixture.run(fixture.mock(), &plan).await;

    assert!(report.record.drive.is_failed());
    assert!(
        report
            .driver_output
            .iter()
            .any(|l| l == "connection refused"),
        "{:?}",
        report.driver_output
    );
}
