//! `taskflow-core`: thin facade crate tying `taskflow-shared` and
//! `taskflow-orchestration` together for embedding applications and
//! end-to-end tests. Production code should depend on the individual
//! crates directly; this crate exists as one place for cross-crate
//! integration tests to live.

pub use taskflow_orchestration as orchestration;
pub use taskflow_shared as shared;
