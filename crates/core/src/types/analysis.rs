use serde::{Deserialize, Serialize};

use super::context::RiskLevel;

/// Confidence assumed when an agent result does not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Output of an agent's analysis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAnalysis {
    /// Advisory analysis payload.
    pub data: serde_json::Value,
    /// Agent's own confidence in [0, 1], if reported.
    pub confidence: Option<f64>,
    /// Declared risk of acting on this analysis.
    pub risk_level: Option<RiskLevel>,
}

impl AgentAnalysis {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            confidence: None,
            risk_level: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = Some(risk);
        self
    }

    /// Wrap a raw JSON result, lifting `confidence` and `risk_level` fields
    /// when present. Unparseable risk levels are ignored.
    pub fn from_value(data: serde_json::Value) -> Self {
        let confidence = data.get("confidence").and_then(|v| v.as_f64());
        let risk_level = data
            .get("risk_level")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok());
        Self {
            data,
            confidence,
            risk_level,
        }
    }

    /// Reported confidence clamped to [0, 1], or the default.
    pub fn effective_confidence(&self) -> f64 {
        self.confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(DEFAULT_CONFIDENCE)
    }
}
