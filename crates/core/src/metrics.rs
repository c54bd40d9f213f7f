//! Metric names and descriptions.
//!
//! Every metric the harness records is named here. Call sites use these
//! constants with `metrics::counter!()` / `metrics::histogram!()`.
//!
//! # Naming
//!
//! - prefix: `devicetest_`
//! - suffix: `_total` (counter), `_seconds` (histogram)
//!
//! ```ignore
//! use devicetest_core::metrics as m;
//!
//! metrics::counter!(m::IDENTITIES_CREATED_TOTAL).increment(1);
//! ```

// ─── Label keys ────────────────────────────────────────────────────

/// Scenario family label key (fleet-provisioning, jobs, shadow)
pub const LABEL_SCENARIO: &str = "scenario";

/// Phase label key (provision, drive, verify, cleanup)
pub const LABEL_PHASE: &str = "phase";

/// Result label key (passed, failed, skipped, not_attempted)
pub const LABEL_RESULT: &str = "result";

// ─── Metrics ───────────────────────────────────────────────────────

/// Completed phases by scenario, phase and result (counter)
pub const PHASE_TOTAL: &str = "devicetest_phase_total";

/// Wall-clock time spent per phase (histogram, seconds)
pub const PHASE_DURATION_SECONDS: &str = "devicetest_phase_duration_seconds";

/// Ephemeral identities created (counter)
pub const IDENTITIES_CREATED_TOTAL: &str = "devicetest_identities_created_total";

/// Ephemeral identities deleted (counter)
pub const IDENTITIES_DELETED_TOTAL: &str = "devicetest_identities_deleted_total";

/// Finished runs by scenario and verdict (counter)
pub const RUNS_TOTAL: &str = "devicetest_runs_total";

/// Registers descriptions for every metric with the installed recorder.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        PHASE_TOTAL,
        "Orchestration phases completed, by scenario, phase and result"
    );
    describe_histogram!(
        PHASE_DURATION_SECONDS,
        "Wall-clock duration of each orchestration phase in seconds"
    );
    describe_counter!(
        IDENTITIES_CREATED_TOTAL,
        "Ephemeral device identities created in the control plane"
    );
    describe_counter!(
        IDENTITIES_DELETED_TOTAL,
        "Ephemeral device identities removed from the control plane"
    );
    describe_counter!(RUNS_TOTAL, "Scenario runs finished, by scenario and verdict");
}
