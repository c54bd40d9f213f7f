//! Assertions over recorded control-plane calls and outcome records.

use devicetest_control_plane::mock::{MockControlPlane, MockOperation};
use devicetest_harness::PhaseOutcome;

/// CLEANUP ran exactly once for `identity` and left nothing behind.
pub fn assert_cleaned_up_once(mock: &MockControlPlane, identity: &str) {
    assert_eq!(
        mock.targets_of(MockOperation::ListThingPrincipals),
        vec![identity.to_owned()],
        "cleanup should look up exactly one identity once"
    );
    assert!(
        !mock.thing_exists(identity),
        "thing {identity} should be deleted"
    );
    assert_eq!(mock.certificate_count(), 0, "no certificate should remain");
}

/// The slot failed with a reason containing `needle`.
pub fn assert_failed_with(outcome: &PhaseOutcome, needle: &str) {
    match outcome {
        PhaseOutcome::Failed(reason) => assert!(
            reason.contains(needle),
            "reason '{reason}' should contain '{needle}'"
        ),
        other => panic!("expected failure containing '{needle}', got {other:?}"),
    }
}
