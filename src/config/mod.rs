//! Configuration loading and validation.

mod loader;
mod types;

pub use types::{
    AdminConfig, CacheConfig, Config, GatewayConfig, ReconcilerConfig, TelemetryConfig,
};
