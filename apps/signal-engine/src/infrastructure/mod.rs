//! Infrastructure Layer
//!
//! Cross-cutting adapters that surround the domain and application layers:
//! configuration loading, the health/metrics HTTP surface, and telemetry.

pub mod config;
pub mod health;
pub mod metrics;
pub mod telemetry;
