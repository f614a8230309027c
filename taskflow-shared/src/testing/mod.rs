//! Test-only fixtures, gated behind the `test-utils` feature.

pub mod factories;
