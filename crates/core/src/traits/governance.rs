//! Governance seams: pluggable policy evaluation and audit sinks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::ExecutionContext;

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    /// Machine-readable reason (`allowed`, `blocked_keyword:<kw>`, ...).
    pub reason: String,
    /// A human may override this denial; the gate reports it as pending.
    pub approval_eligible: bool,
    /// Which checks ran and passed, for audit explainability.
    pub metadata: Value,
}

impl PolicyDecision {
    pub fn allow(metadata: Value) -> Self {
        Self {
            allowed: true,
            reason: "allowed".into(),
            approval_eligible: false,
            metadata,
        }
    }

    pub fn deny(reason: impl Into<String>, approval_eligible: bool, metadata: Value) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            approval_eligible,
            metadata,
        }
    }
}

/// Decides whether an analysed call may proceed to execution.
///
/// Evaluation must be deterministic: identical policy, data and confidence
/// always yield the same decision.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(
        &self,
        actor: &str,
        ctx: &ExecutionContext,
        data: &Value,
        confidence: f64,
    ) -> Result<PolicyDecision>;
}

/// Append-only, tamper-evident record of gate decisions.
pub trait AuditSink: Send + Sync {
    /// Persist one event for the tenant and return its chain hash.
    fn log(&self, tenant_id: &str, event: &Value) -> Result<String>;
}
