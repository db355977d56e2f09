use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::RiskLevel;

// =============================================================================
// Operative Result (gate output)
// =============================================================================

/// Terminal status of one gated invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperativeStatus {
    Success,
    Failed,
    PendingApproval,
    BlockedByPolicy,
    BlockedByCircuit,
    RateLimited,
    Timeout,
    Error,
}

impl OperativeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::PendingApproval => "pending_approval",
            Self::BlockedByPolicy => "blocked_by_policy",
            Self::BlockedByCircuit => "blocked_by_circuit",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for OperativeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type name plus a bounded message fragment.
///
/// Never carries a full backtrace; the fragment is truncated so internals do
/// not leak into the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub error_type: String,
    pub trace: String,
}

impl ErrorDetail {
    /// Max characters kept from the error message.
    pub const MAX_TRACE_CHARS: usize = 200;

    pub fn new(error_type: impl Into<String>, message: &str) -> Self {
        let trace: String = message.chars().take(Self::MAX_TRACE_CHARS).collect();
        Self {
            error_type: error_type.into(),
            trace,
        }
    }
}

/// The single value returned by `execute_operative`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperativeResult {
    pub ok: bool,
    pub status: OperativeStatus,
    pub reason: String,
    pub data: serde_json::Value,
    pub audit_hash: Option<String>,
    pub correlation_id: String,
    pub execution_time_ms: f64,
    pub confidence: f64,
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl OperativeResult {
    /// True only for results waiting on a human decision.
    pub fn needs_approval(&self) -> bool {
        self.status == OperativeStatus::PendingApproval
    }

    pub fn is_blocked(&self) -> bool {
        matches!(
            self.status,
            OperativeStatus::BlockedByPolicy
                | OperativeStatus::BlockedByCircuit
                | OperativeStatus::RateLimited
        )
    }
}
