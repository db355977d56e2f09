use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Autonomy & Risk
// =============================================================================

/// How much unattended execution a call is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Every execution needs human sign-off.
    Manual,
    /// Executes unattended unless confidence or risk gates trip.
    Semi,
    /// Executes unattended when policy allows.
    #[default]
    FullAuto,
}

impl AutonomyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Semi => "semi",
            Self::FullAuto => "full_auto",
        }
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk classification reported by an agent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High and critical actions are subject to approval gating.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

// =============================================================================
// Execution Context
// =============================================================================

/// Immutable per-call context carried through every gate stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub tenant_id: String,
    pub correlation_id: String,
    pub action_type: String,
    pub autonomy_level: AutonomyLevel,
    pub confidence_threshold: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ExecutionContext {
    /// Start building a context for `tenant_id` / `action_type`.
    pub fn builder(
        tenant_id: impl Into<String>,
        action_type: impl Into<String>,
    ) -> ExecutionContextBuilder {
        ExecutionContextBuilder {
            tenant_id: tenant_id.into(),
            action_type: action_type.into(),
            correlation_id: None,
            autonomy_level: AutonomyLevel::default(),
            confidence_threshold: 0.7,
            metadata: BTreeMap::new(),
        }
    }

    /// Key partitioning per-tenant, per-action state.
    pub fn state_key(&self) -> StateKey {
        StateKey::new(&self.tenant_id, &self.action_type)
    }
}

/// `(tenant_id, action)` key used by the circuit breaker and rate limiter.
///
/// Both parts are kept separate, so no choice of tenant or action text can
/// alias another pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    pub tenant_id: String,
    pub action: String,
}

impl StateKey {
    pub fn new(tenant_id: &str, action: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            action: action.to_string(),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant_id, self.action)
    }
}

/// Builder for [`ExecutionContext`].
#[derive(Debug, Clone)]
pub struct ExecutionContextBuilder {
    tenant_id: String,
    action_type: String,
    correlation_id: Option<String>,
    autonomy_level: AutonomyLevel,
    confidence_threshold: f64,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl ExecutionContextBuilder {
    pub fn correlation_id(mut self, id: Option<String>) -> Self {
        self.correlation_id = id.filter(|s| !s.is_empty());
        self
    }

    pub fn autonomy_level(mut self, level: AutonomyLevel) -> Self {
        self.autonomy_level = level;
        self
    }

    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Freeze the context, generating a correlation id if none was given.
    pub fn build(self) -> ExecutionContext {
        ExecutionContext {
            tenant_id: self.tenant_id,
            correlation_id: self
                .correlation_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            action_type: self.action_type,
            autonomy_level: self.autonomy_level,
            confidence_threshold: self.confidence_threshold,
            timestamp: Utc::now(),
            metadata: self.metadata,
        }
    }
}

/// Encode an identifier as a single file path segment.
///
/// Bytes outside `[A-Za-z0-9._~-]` are percent-encoded, so distinct ids always
/// map to distinct segments and no id can walk out of its directory. The
/// empty id and the dot names get encodings `urlencoding` never produces.
pub fn sanitize_segment(raw: &str) -> String {
    match raw {
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(raw).into_owned(),
    }
}
