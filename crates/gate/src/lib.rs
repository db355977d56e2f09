#![deny(unused)]
//! Operative Gate: multi-tenant execution control for business-logic agents.
//!
//! Wraps every agent call with a per-tenant circuit breaker, a per-tenant
//! token bucket, a pluggable policy engine, and a hash-chained audit log.

pub mod binding;
pub mod builder;
pub mod gate;
pub mod request;

pub use binding::{BoundAgent, IntoOperative};
pub use builder::GateBuilder;
pub use gate::Gate;
pub use request::OperativeRequest;
