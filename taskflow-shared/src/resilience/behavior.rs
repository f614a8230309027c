//! Unifies circuit breaker implementations behind one object-safe trait, so
//! callers that just need `should_allow`/`record_*` can hold a
//! `&dyn CircuitBreakerBehavior` without caring which component it guards.

use crate::resilience::{CircuitBreakerMetrics, CircuitState};
use std::time::Duration;

pub trait CircuitBreakerBehavior: Send + Sync + std::fmt::Debug {
    /// Get the component name this circuit breaker protects
    fn name(&self) -> &str;

    /// Get the current circuit state
    fn state(&self) -> CircuitState;

    /// Check if the circuit allows the next call.
    ///
    /// Returns `true` for Closed state, `true` for HalfOpen (limited), and
    /// `true` for Open only when the recovery timeout has elapsed (transitioning to HalfOpen).
    fn should_allow(&self) -> bool;

    /// Record a successful operation with its duration
    fn record_success(&self, duration: Duration);

    /// Record a failed operation with its duration
    fn record_failure(&self, duration: Duration);

    /// Check if the circuit breaker considers the component healthy
    fn is_healthy(&self) -> bool;

    /// Force the circuit to open state (emergency kill switch)
    fn force_open(&self);

    /// Force the circuit to closed state (emergency recovery)
    fn force_closed(&self);

    /// Get a metrics snapshot for observability
    fn metrics(&self) -> CircuitBreakerMetrics;
}
