//! E2E test scenarios.

mod cleanup_invariant;
mod fleet_provisioning;
mod jobs;
mod panic_containment;
mod shadow;
mod timeout;
mod verdict;
