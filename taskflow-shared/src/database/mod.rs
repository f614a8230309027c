//! Persistence layer: migrations and the readiness/context aggregate
//! queries.

pub mod migrator;
mod sql_functions;

pub use sql_functions::{
    ExecutionStatus, HealthStatus, RecommendedAction, SqlFunctionExecutor, StepReadiness,
    TaskExecutionContext,
};
