//! Per-tenant policy engine.
//!
//! Each tenant has one JSON policy document at `<policy_dir>/<tenant>.json`.
//! Documents are loaded lazily, cached, and only re-read after an explicit
//! invalidation. Tenants without a document get [`PolicyDocument::default`].

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use operative_core::{
    canonical::to_canonical_string,
    traits::{PolicyDecision, PolicyEvaluator},
    types::{sanitize_segment, AutonomyLevel, ExecutionContext, RiskLevel},
    Error, Result,
};

/// Fields searched, in order, for the primary text of a payload.
const PRIMARY_TEXT_FIELDS: &[&str] = &["content", "text", "body", "message"];

/// How `allowed_actions` / `denied_actions` are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// No action filtering.
    #[default]
    Default,
    /// Only `allowed_actions` may run.
    Allowlist,
    /// Everything except `denied_actions` may run.
    Denylist,
}

/// A tenant's policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDocument {
    pub min_confidence: f64,
    pub max_content_length: usize,
    pub mode: PolicyMode,
    pub allowed_actions: Vec<String>,
    pub denied_actions: Vec<String>,
    pub blocked_keywords: Vec<String>,
    pub require_approval_for_high_risk: bool,
    pub high_risk_threshold: f64,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            max_content_length: 10_000,
            mode: PolicyMode::Default,
            allowed_actions: Vec::new(),
            denied_actions: Vec::new(),
            blocked_keywords: Vec::new(),
            require_approval_for_high_risk: true,
            high_risk_threshold: 0.9,
        }
    }
}

impl PolicyDocument {
    /// Load a policy document from a JSON file.
    pub fn load(tenant_id: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::PolicyLoad {
            tenant: tenant_id.to_string(),
            reason: format!("failed to read {:?}: {}", path, e),
        })?;
        serde_json::from_str(&content).map_err(|e| Error::PolicyLoad {
            tenant: tenant_id.to_string(),
            reason: format!("failed to parse {:?}: {}", path, e),
        })
    }

    fn action_permitted(&self, action: &str) -> Option<&'static str> {
        match self.mode {
            PolicyMode::Allowlist if !self.allowed_actions.iter().any(|a| a == action) => {
                Some("action_not_allowed")
            }
            PolicyMode::Denylist if self.denied_actions.iter().any(|a| a == action) => {
                Some("action_denied")
            }
            _ => None,
        }
    }
}

/// Where a cached document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySource {
    File,
    Default,
    Override,
}

impl PolicySource {
    fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Default => "default",
            Self::Override => "override",
        }
    }
}

#[derive(Debug, Clone)]
struct CachedPolicy {
    doc: Arc<PolicyDocument>,
    source: PolicySource,
}

/// File-backed, cached policy evaluator.
///
/// The cache is keyed by the raw tenant id. Every invalidation bumps a
/// generation counter; a load that started under an older generation is
/// returned to its caller but never cached.
pub struct PolicyEngine {
    policy_dir: PathBuf,
    cache: DashMap<String, CachedPolicy>,
    generation: AtomicU64,
}

impl PolicyEngine {
    pub fn new(policy_dir: impl Into<PathBuf>) -> Self {
        Self {
            policy_dir: policy_dir.into(),
            cache: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Path of a tenant's policy document.
    pub fn policy_path(&self, tenant_id: &str) -> PathBuf {
        self.policy_dir
            .join(format!("{}.json", sanitize_segment(tenant_id)))
    }

    /// Cached document for a tenant, loading it on first use.
    pub fn policy_for(&self, tenant_id: &str) -> Result<(Arc<PolicyDocument>, PolicySource)> {
        if let Some(cached) = self.cache.get(tenant_id) {
            return Ok((cached.doc.clone(), cached.source));
        }

        // Load outside the shard lock.
        let generation = self.generation.load(Ordering::Acquire);
        let loaded = self.load(tenant_id)?;
        let cached = self.cache_if_current(tenant_id, loaded, generation);
        Ok((cached.doc, cached.source))
    }

    fn load(&self, tenant_id: &str) -> Result<CachedPolicy> {
        let path = self.policy_path(tenant_id);
        if path.exists() {
            let doc = PolicyDocument::load(tenant_id, &path)?;
            tracing::debug!(tenant_id = tenant_id, path = ?path, "Loaded tenant policy");
            Ok(CachedPolicy {
                doc: Arc::new(doc),
                source: PolicySource::File,
            })
        } else {
            tracing::debug!(tenant_id = tenant_id, "No policy file, using default policy");
            Ok(CachedPolicy {
                doc: Arc::new(PolicyDocument::default()),
                source: PolicySource::Default,
            })
        }
    }

    /// Insert `loaded` unless an entry already exists or an invalidation
    /// happened since `generation` was read. The check runs under the
    /// entry's shard lock, which `invalidate` must also take to remove.
    fn cache_if_current(
        &self,
        tenant_id: &str,
        loaded: CachedPolicy,
        generation: u64,
    ) -> CachedPolicy {
        match self.cache.entry(tenant_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => existing.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                if self.generation.load(Ordering::Acquire) == generation {
                    slot.insert(loaded.clone());
                } else {
                    tracing::debug!(tenant_id = tenant_id, "Policy invalidated during load, not caching");
                }
                loaded
            }
        }
    }

    /// Install an in-memory document for a tenant, bypassing the file.
    pub fn set_policy(&self, tenant_id: &str, doc: PolicyDocument) {
        self.cache.insert(
            tenant_id.to_string(),
            CachedPolicy {
                doc: Arc::new(doc),
                source: PolicySource::Override,
            },
        );
    }

    /// Drop a tenant's cached document so the next evaluation re-reads it.
    pub fn invalidate(&self, tenant_id: &str) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.remove(tenant_id);
        tracing::info!(tenant_id = tenant_id, "Policy cache invalidated");
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.clear();
        tracing::info!("Policy cache cleared");
    }
}

/// First string field among [`PRIMARY_TEXT_FIELDS`].
fn primary_text(data: &Value) -> Option<&str> {
    PRIMARY_TEXT_FIELDS
        .iter()
        .find_map(|field| data.get(*field).and_then(|v| v.as_str()))
}

fn declared_risk(data: &Value) -> Option<RiskLevel> {
    data.get("risk_level")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}

impl PolicyEvaluator for PolicyEngine {
    /// Run the checks in fixed order; the first failure decides.
    ///
    /// The keyword scan covers the whole serialized payload, advisory
    /// analysis output included, so a blocked term echoed by an agent blocks
    /// the call even if the caller never wrote it.
    fn evaluate(
        &self,
        actor: &str,
        ctx: &ExecutionContext,
        data: &Value,
        confidence: f64,
    ) -> Result<PolicyDecision> {
        let (policy, source) = self.policy_for(&ctx.tenant_id)?;
        let mut passed: Vec<&'static str> = Vec::with_capacity(6);
        let meta = |passed: &[&'static str]| {
            json!({
                "actor": actor,
                "policy_source": source.as_str(),
                "mode": policy.mode,
                "checks_passed": passed,
            })
        };

        // 1. Blocked keywords
        if !policy.blocked_keywords.is_empty() {
            let haystack = to_canonical_string(data)?.to_lowercase();
            if let Some(kw) = policy
                .blocked_keywords
                .iter()
                .find(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()))
            {
                return Ok(PolicyDecision::deny(
                    format!("blocked_keyword:{}", kw),
                    false,
                    meta(&passed),
                ));
            }
        }
        passed.push("blocked_keywords");

        // 2. Confidence floor
        if confidence < policy.min_confidence {
            return Ok(PolicyDecision::deny("low_confidence", true, meta(&passed)));
        }
        passed.push("min_confidence");

        // 3. Content length
        if let Some(text) = primary_text(data) {
            if text.chars().count() > policy.max_content_length {
                return Ok(PolicyDecision::deny("content_too_long", false, meta(&passed)));
            }
        }
        passed.push("max_content_length");

        // 4. Action permission
        if let Some(reason) = policy.action_permitted(&ctx.action_type) {
            return Ok(PolicyDecision::deny(reason, false, meta(&passed)));
        }
        passed.push("action_permission");

        // 5. High risk
        if policy.require_approval_for_high_risk {
            let elevated = declared_risk(data).is_some_and(|r| r.is_elevated());
            if elevated
                && (confidence < policy.high_risk_threshold
                    || ctx.autonomy_level == AutonomyLevel::Semi)
            {
                return Ok(PolicyDecision::deny(
                    "high_risk_requires_approval",
                    true,
                    meta(&passed),
                ));
            }
        }
        passed.push("high_risk");

        // 6. Manual autonomy always needs sign-off
        if ctx.autonomy_level == AutonomyLevel::Manual {
            return Ok(PolicyDecision::deny(
                "manual_approval_required",
                true,
                meta(&passed),
            ));
        }
        passed.push("autonomy");

        Ok(PolicyDecision::allow(meta(&passed)))
    }
}
