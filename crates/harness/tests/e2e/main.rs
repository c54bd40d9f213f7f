//! E2E tests for the devicetest orchestration engine.
//!
//! Every test runs a full scenario plan against the in-memory control plane
//! with `/bin/sh` one-liners standing in for the device sample.
//!
//! # Test Structure
//!
//! - `helpers/` -- fixture builder (mock control plane, descriptors, plans)
//!   and assertions on recorded control-plane calls
//! - `scenarios/` -- tests grouped by property (cleanup, verdict, timeout,
//!   per-family verification, panic containment)
//!
//! # Running
//!
//! ```bash
//! cargo test -p devicetest-harness --test e2e
//! ```

#![cfg(unix)]

mod helpers;
mod scenarios;
