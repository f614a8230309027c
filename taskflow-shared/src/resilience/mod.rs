//! Circuit-breaker resilience primitives guarding infrastructure calls
//! (database readiness query, job queue) — not the business-level step
//! retry, which is governed by `retry::BackoffCalculator` instead.

mod behavior;
mod circuit_breaker;
mod metrics;

pub use behavior::CircuitBreakerBehavior;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use metrics::{CircuitBreakerMetrics, MetricsCollector};
