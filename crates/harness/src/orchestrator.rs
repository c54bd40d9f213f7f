//! Scenario orchestrator -- runs one plan through every phase.
//!
//! ```text
//! START -> [PROVISION] -> DRIVE -> VERIFY -> CLEANUP -> DONE
//!          \______ protected region ______/
//! ```
//!
//! The protected region runs as its own task. Whatever happens inside it
//! (an error, an early return or a panic) the join point is followed by
//! CLEANUP, which deletes the identity exactly once in a task of its own,
//! under its own timeout. A panic in either task becomes a failed slot.
//! Each phase writes its slot into a shared [`OutcomeRecord`] as soon as it
//! finishes, so a panic loses nothing already recorded.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinError;
use tracing::{error, info};

use devicetest_control_plane::{DeviceStateQuery, IdentityRegistry, SecretStore};
use devicetest_core::config::DriverConfig;
use devicetest_core::metrics as m;
use devicetest_core::{DeviceTestError, RunId, ScenarioKind};

use crate::driver::TestDriver;
use crate::lifecycle::{DeleteOutcome, LifecycleManager};
use crate::outcome::{OutcomeRecord, Phase, PhaseOutcome, Verdict};
use crate::scenario::ScenarioPlan;
use crate::secret::SecretResolver;
use crate::verifier::ScenarioVerifier;

/// Everything known about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario: ScenarioKind,
    pub run_id: RunId,
    pub identity_name: String,
    pub record: OutcomeRecord,
    pub verdict: Verdict,
    /// Tail of the driven process output when DRIVE failed.
    pub driver_output: Vec<String>,
}

impl RunReport {
    pub fn summary_lines(&self) -> Vec<String> {
        self.record.summary_lines()
    }
}

/// State written by the protected region and read after it joins.
#[derive(Debug, Default)]
struct RunState {
    record: OutcomeRecord,
    driver_output: Vec<String>,
}

type SharedState = Arc<Mutex<RunState>>;

fn with_state<T>(state: &SharedState, f: impl FnOnce(&mut RunState) -> T) -> T {
    f(&mut state.lock().unwrap_or_else(PoisonError::into_inner))
}

struct Components<S: SecretStore, R: IdentityRegistry, Q: DeviceStateQuery> {
    lifecycle: LifecycleManager<R, S>,
    driver: TestDriver<S>,
    verifier: ScenarioVerifier<Q, R, S>,
}

/// Runs scenario plans against one control plane.
pub struct Orchestrator<S: SecretStore, R: IdentityRegistry, Q: DeviceStateQuery> {
    components: Arc<Components<S, R, Q>>,
    cleanup_timeout: Duration,
}

impl<S, R, Q> Orchestrator<S, R, Q>
where
    S: SecretStore,
    R: IdentityRegistry,
    Q: DeviceStateQuery,
{
    pub fn new(secrets: Arc<S>, registry: Arc<R>, query: Arc<Q>, driver_config: &DriverConfig) -> Self {
        let resolver = SecretResolver::new(secrets);
        let components = Components {
            lifecycle: LifecycleManager::new(Arc::clone(&registry), resolver.clone()),
            driver: TestDriver::new(
                resolver.clone(),
                driver_config.timeout(),
                driver_config.output_tail_lines,
            ),
            verifier: ScenarioVerifier::new(query, registry, resolver),
        };
        Self {
            components: Arc::new(components),
            cleanup_timeout: driver_config.cleanup_timeout(),
        }
    }

    /// Runs `plan` to completion. Never fails: every error ends up in the
    /// returned report.
    pub async fn run(&self, plan: &ScenarioPlan) -> RunReport {
        let plan = Arc::new(plan.clone());
        let state: SharedState = Arc::default();

        info!(
            scenario = %plan.kind,
            run_id = %plan.run_id,
            identity = plan.identity_name.as_str(),
            scenario_file = %plan.scenario_path.display(),
            "starting scenario run"
        );

        let protected = tokio::spawn(protected_region(
            Arc::clone(&self.components),
            Arc::clone(&plan),
            Arc::clone(&state),
        ));
        if let Err(join_error) = protected.await {
            record_join_error(&plan, &state, join_error);
        }

        let started = Instant::now();
        let task = tokio::spawn(cleanup(Arc::clone(&self.components), Arc::clone(&plan)));
        let abort = task.abort_handle();
        let cleanup_failed = |reason: String| DeviceTestError::CleanupFailed {
            identity: plan.identity_name.clone(),
            reason,
        };
        let result = match tokio::time::timeout(self.cleanup_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(cleanup_failed(join_failure_reason(join_error))),
            Err(_elapsed) => {
                abort.abort();
                Err(cleanup_failed(format!(
                    "timed out after {}s",
                    self.cleanup_timeout.as_secs()
                )))
            }
        };
        finish_phase(&plan, &state, Phase::Cleanup, &result, started);

        let (record, driver_output) = with_state(&state, |s| {
            (s.record.clone(), std::mem::take(&mut s.driver_output))
        });
        let verdict = record.verdict();
        metrics::counter!(
            m::RUNS_TOTAL,
            m::LABEL_SCENARIO => plan.kind.as_str(),
            m::LABEL_RESULT => verdict.label()
        )
        .increment(1);

        if verdict.is_success() {
            info!(scenario = %plan.kind, run_id = %plan.run_id, "scenario passed");
        } else {
            error!(
                scenario = %plan.kind,
                run_id = %plan.run_id,
                failures = record.failures().len(),
                "scenario failed"
            );
        }

        RunReport {
            scenario: plan.kind,
            run_id: plan.run_id.clone(),
            identity_name: plan.identity_name.clone(),
            record,
            verdict,
            driver_output,
        }
    }
}

/// PROVISION -> DRIVE -> VERIFY. Returns early on the first failure; the
/// remaining slots stay `NotAttempted`.
async fn protected_region<S, R, Q>(
    components: Arc<Components<S, R, Q>>,
    plan: Arc<ScenarioPlan>,
    state: SharedState,
) where
    S: SecretStore,
    R: IdentityRegistry,
    Q: DeviceStateQuery,
{
    match &plan.provision {
        Some(spec) => {
            let started = Instant::now();
            let result = components
                .lifecycle
                .create(
                    &plan.identity_name,
                    &spec.policy,
                    &spec.certificate_path,
                    &spec.key_path,
                    spec.thing_group.as_deref(),
                )
                .await;
            if !finish_phase(&plan, &state, Phase::Provision, &result, started) {
                return;
            }
        }
        None => skip_phase(&plan, &state, Phase::Provision),
    }

    let started = Instant::now();
    let result = components
        .driver
        .run(&plan.scenario_path, &plan.drive_context())
        .await
        .and_then(|report| {
            if !report.passed() {
                let output = report.captured_output.clone();
                with_state(&state, |s| s.driver_output = output);
            }
            report.into_result()
        });
    if !finish_phase(&plan, &state, Phase::Drive, &result, started) {
        return;
    }

    let started = Instant::now();
    let result = components
        .verifier
        .verify(&plan.expectation, &plan.identity_name)
        .await;
    finish_phase(&plan, &state, Phase::Verify, &result, started);
}

/// Records a phase result; returns whether it passed.
fn finish_phase<T>(
    plan: &ScenarioPlan,
    state: &SharedState,
    phase: Phase,
    result: &Result<T, DeviceTestError>,
    started: Instant,
) -> bool {
    let outcome = PhaseOutcome::from_result(result);
    let elapsed = started.elapsed();

    metrics::histogram!(
        m::PHASE_DURATION_SECONDS,
        m::LABEL_SCENARIO => plan.kind.as_str(),
        m::LABEL_PHASE => phase.as_str()
    )
    .record(elapsed.as_secs_f64());

    match &outcome {
        PhaseOutcome::Failed(reason) => error!(
            scenario = %plan.kind,
            identity = plan.identity_name.as_str(),
            phase = phase.as_str(),
            reason = reason.as_str(),
            "phase failed"
        ),
        _ => info!(
            scenario = %plan.kind,
            identity = plan.identity_name.as_str(),
            phase = phase.as_str(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "phase passed"
        ),
    }

    let passed = outcome.is_passed();
    set_outcome(plan, state, phase, outcome);
    passed
}

fn skip_phase(plan: &ScenarioPlan, state: &SharedState, phase: Phase) {
    info!(scenario = %plan.kind, phase = phase.as_str(), "phase skipped");
    set_outcome(plan, state, phase, PhaseOutcome::Skipped);
}

fn set_outcome(plan: &ScenarioPlan, state: &SharedState, phase: Phase, outcome: PhaseOutcome) {
    metrics::counter!(
        m::PHASE_TOTAL,
        m::LABEL_SCENARIO => plan.kind.as_str(),
        m::LABEL_PHASE => phase.as_str(),
        m::LABEL_RESULT => outcome.label()
    )
    .increment(1);
    with_state(state, |s| s.record.set(phase, outcome));
}

/// Deletes the identity and the local credential files.
async fn cleanup<S, R, Q>(
    components: Arc<Components<S, R, Q>>,
    plan: Arc<ScenarioPlan>,
) -> Result<DeleteOutcome, DeviceTestError>
where
    S: SecretStore,
    R: IdentityRegistry,
    Q: DeviceStateQuery,
{
    let result = components.lifecycle.delete(&plan.identity_name).await;
    if let Some(provision) = &plan.provision {
        components
            .lifecycle
            .remove_credentials(&provision.certificate_path, &provision.key_path)
            .await;
    }
    if let Ok(DeleteOutcome::NotFound) = result {
        info!(identity = plan.identity_name.as_str(), "identity already absent");
    }
    result
}

fn join_failure_reason(join_error: JoinError) -> String {
    if join_error.is_panic() {
        let payload = join_error.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_owned());
        format!("panicked: {message}")
    } else {
        "task cancelled".to_owned()
    }
}

/// Attributes a crashed protected region to the phase that was running.
fn record_join_error(plan: &ScenarioPlan, state: &SharedState, join_error: JoinError) {
    let reason = join_failure_reason(join_error);
    let phase = with_state(state, |s| s.record.pending_phase()).unwrap_or(Phase::Verify);
    error!(
        scenario = %plan.kind,
        identity = plan.identity_name.as_str(),
        phase = phase.as_str(),
        reason = reason.as_str(),
        "protected region crashed"
    );
    set_outcome(plan, state, phase, PhaseOutcome::Failed(reason));
}
