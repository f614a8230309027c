//! Layered, typed configuration, loaded via
//! the `config` crate from a base TOML file plus environment overrides and
//! `TASKFLOW_`-prefixed environment variables, with base/environment TOML
//! layering.

use crate::error::CoreError;
use crate::retry::BackoffConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/taskflow".to_string(),
            max_connections: 10,
        }
    }
}

/// Bounded-concurrency and reenqueue-delay knobs for the Executor and
/// Finalizer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestrationConfig {
    pub min_concurrent_steps: usize,
    pub max_concurrent_steps: usize,
    pub reenqueue_processing_delay_seconds: i64,
    pub reenqueue_waiting_delay_seconds: i64,
    pub reenqueue_blocked_max_delay_seconds: i64,
    pub max_coordinator_iterations: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            min_concurrent_steps: 1,
            max_concurrent_steps: 10,
            reenqueue_processing_delay_seconds: 10,
            reenqueue_waiting_delay_seconds: 45,
            reenqueue_blocked_max_delay_seconds: 300,
            max_coordinator_iterations: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerComponentConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_seconds: u64,
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CircuitBreakersConfig {
    pub task_readiness: CircuitBreakerComponentConfig,
    pub job_queue: CircuitBreakerComponentConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub circuit_breakers: CircuitBreakersConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            orchestration: OrchestrationConfig::default(),
            circuit_breakers: CircuitBreakersConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load `base.toml`, an optional `{environment}.toml` override, and
    /// `TASKFLOW_`-prefixed environment variables, in that precedence order.
    pub fn load(config_dir: &str, environment: &str) -> Result<Self, CoreError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(&format!("{config_dir}/base")).required(false))
            .add_source(
                config::File::with_name(&format!("{config_dir}/{environment}")).required(false),
            )
            .add_source(config::Environment::with_prefix("TASKFLOW").separator("__"));

        let built = builder
            .build()
            .map_err(|e| CoreError::Configuration(e.to_string()))?;

        built
            .try_deserialize()
            .map_err(|e| CoreError::Configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = CoreConfig::default();
        assert!(config.orchestration.min_concurrent_steps <= config.orchestration.max_concurrent_steps);
    }
}
