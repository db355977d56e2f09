#![deny(unused)]
//! Execution-control components for the Operative Gate.
//!
//! This crate provides:
//! - Per-tenant circuit breaker
//! - Per-tenant token-bucket rate limiter
//! - File-backed, cached policy engine
//! - Hash-chained audit logger
//! - Merkle-verifiable conversion manifest
//! - Logging and metrics setup

pub mod audit;
pub mod circuit_breaker;
pub mod manifest;
pub mod metrics;
pub mod policy;
pub mod rate_limiter;
pub mod tracing_layer;

pub use audit::{AuditRecord, ImmutableAuditLogger};
pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitDecision, CircuitState};
pub use manifest::{ConversionManifest, ManifestEntry};
pub use metrics::{setup_metrics_recorder, track_circuit_transition, track_decision};
pub use policy::{PolicyDocument, PolicyEngine, PolicyMode, PolicySource};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use tracing_layer::configure_tracing;
