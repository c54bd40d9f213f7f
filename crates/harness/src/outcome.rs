//! Per-phase outcomes and the run verdict.
//!
//! # Aggregation rule
//!
//! - any slot `Failed` -> run failed
//! - any slot `NotAttempted` -> run failed (an unreached phase never counts
//!   as success)
//! - every slot `Passed` or `Skipped` -> run passed

use std::fmt;

use serde::Serialize;

use devicetest_core::DeviceTestError;

/// Orchestration phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Provision,
    Drive,
    Verify,
    Cleanup,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Provision, Phase::Drive, Phase::Verify, Phase::Cleanup];

    /// Fixed label for logs and metric tags.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Drive => "drive",
            Self::Verify => "verify",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result slot of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum PhaseOutcome {
    Passed,
    Failed(String),
    /// The scenario has no such phase.
    Skipped,
    /// An earlier phase failed, so this one never ran.
    NotAttempted,
}

impl PhaseOutcome {
    pub fn from_result<T>(result: &Result<T, DeviceTestError>) -> Self {
        match result {
            Ok(_) => Self::Passed,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Fixed label for logs and metric tags.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed(_) => "failed",
            Self::Skipped => "skipped",
            Self::NotAttempted => "not_attempted",
        }
    }
}

/// Final verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    pub fn is_success(self) -> bool {
        self == Self::Passed
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// Outcome of every phase of one run. All slots start `NotAttempted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRecord {
    pub provision: PhaseOutcome,
    pub drive: PhaseOutcome,
    pub verify: PhaseOutcome,
    pub cleanup: PhaseOutcome,
}

impl Default for OutcomeRecord {
    fn default() -> Self {
        Self {
            provision: PhaseOutcome::NotAttempted,
            drive: PhaseOutcome::NotAttempted,
            verify: PhaseOutcome::NotAttempted,
            cleanup: PhaseOutcome::NotAttempted,
        }
    }
}

impl OutcomeRecord {
    pub fn get(&self, phase: Phase) -> &PhaseOutcome {
        match phase {
            Phase::Provision => &self.provision,
            Phase::Drive => &self.drive,
            Phase::Verify => &self.verify,
            Phase::Cleanup => &self.cleanup,
        }
    }

    pub fn set(&mut self, phase: Phase, outcome: PhaseOutcome) {
        let slot = match phase {
            Phase::Provision => &mut self.provision,
            Phase::Drive => &mut self.drive,
            Phase::Verify => &mut self.verify,
            Phase::Cleanup => &mut self.cleanup,
        };
        *slot = outcome;
    }

    /// First phase before cleanup that has not recorded an outcome yet.
    pub fn pending_phase(&self) -> Option<Phase> {
        [Phase::Provision, Phase::Drive, Phase::Verify]
            .into_iter()
            .find(|p| *self.get(*p) == PhaseOutcome::NotAttempted)
    }

    pub fn verdict(&self) -> Verdict {
        let success = Phase::ALL
            .iter()
            .all(|p| matches!(self.get(*p), PhaseOutcome::Passed | PhaseOutcome::Skipped));
        if success {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }

    /// Failed phases with their reasons, in phase order.
    pub fn failures(&self) -> Vec<(Phase, &str)> {
        Phase::ALL
            .iter()
            .filter_map(|p| match self.get(*p) {
                PhaseOutcome::Failed(reason) => Some((*p, reason.as_str())),
                _ => None,
            })
            .collect()
    }

    /// One line per failure reason, or a single success line.
    pub fn summary_lines(&self) -> Vec<String> {
        let failures = self.failures();
        if failures.is_empty() && self.verdict().is_success() {
            return vec!["all phases passed".to_owned()];
        }

        let mut lines: Vec<String> = failures
            .into_iter()
            .map(|(phase, reason)| format!("ERROR: {phase} failed: {reason}"))
            .collect();
        lines.extend(
            Phase::ALL
                .iter()
                .filter(|p| *self.get(**p) == PhaseOutcome::NotAttempted)
                .map(|p| format!("ERROR: {p} not attempted")),
        );
        lines
    }
}
