//! Arguments of one `execute_operative` call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use operative_core::types::AutonomyLevel;

/// Input plus the per-call knobs of a gated invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperativeRequest {
    pub input: Value,
    pub tenant_id: String,
    /// Falls back to the agent's default action.
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub autonomy_level: AutonomyLevel,
    /// Overrides the confidence the agent reports.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Generated when absent.
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl OperativeRequest {
    pub fn new(tenant_id: impl Into<String>, input: Value) -> Self {
        Self {
            input,
            tenant_id: tenant_id.into(),
            action_type: None,
            autonomy_level: AutonomyLevel::default(),
            confidence: None,
            correlation_id: None,
        }
    }

    pub fn action(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = Some(action_type.into());
        self
    }

    pub fn autonomy(mut self, level: AutonomyLevel) -> Self {
        self.autonomy_level = level;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}
