//! devicetest orchestration engine.
//!
//! Runs one scenario against a live (or mock) control plane:
//!
//! 1. [`lifecycle`]: provisions the ephemeral identity
//! 2. [`driver`]: launches the process under test
//! 3. [`verifier`]: checks the expected side effect
//! 4. [`lifecycle`]: deletes the identity, always
//!
//! [`orchestrator::Orchestrator`] sequences the phases and aggregates the
//! per-phase [`outcome::PhaseOutcome`]s into a [`outcome::Verdict`].

pub mod driver;
pub mod lifecycle;
pub mod orchestrator;
pub mod outcome;
pub mod scenario;
pub mod secret;
pub mod verifier;

pub use driver::{DriveContext, DriverReport, DriverStatus, ScenarioDescriptor, TestDriver};
pub use lifecycle::{DeleteOutcome, IdentityHandle, LifecycleManager, PolicyRef};
pub use orchestrator::{Orchestrator, RunReport};
pub use outcome::{OutcomeRecord, Phase, PhaseOutcome, Verdict};
pub use scenario::{ScenarioPlan, ScenarioRequest, ScenarioVariant, scenario_file_name};
pub use secret::SecretResolver;
pub use verifier::{Expectation, ScenarioVerifier};
