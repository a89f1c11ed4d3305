//! Infrastructure Layer - adapters and external integrations.
//!
//! Configuration loading, health/metrics endpoints, and tracing setup that
//! surround the domain and application logic without being part of it.

/// Configuration and dependency injection.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
