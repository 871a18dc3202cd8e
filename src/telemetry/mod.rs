//! Logging and metrics.

pub mod metrics;
mod tracing;

pub use self::tracing::init_tracing;
