//! Core traits for the Operative Gate.
//!
//! - `agent`: wrapped collaborators (Agent, Executor)
//! - `governance`: pluggable checks and sinks (PolicyEvaluator, AuditSink)

pub mod agent;
pub mod governance;

pub use agent::*;
pub use governance::*;
