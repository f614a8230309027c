mod backoff;

pub use backoff::{BackoffCalculator, BackoffConfig};
