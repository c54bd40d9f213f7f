//! Shared E2E test helpers.

pub mod assertions;
pub mod fixture;
