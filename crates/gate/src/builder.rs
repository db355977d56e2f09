//! Builder for the Gate.

use std::sync::Arc;

use operative_core::{
    config::GateConfig,
    traits::{AuditSink, Executor, PassthroughExecutor, PolicyEvaluator},
    Result,
};
use operative_governance::{
    CircuitBreaker, ConversionManifest, ImmutableAuditLogger, PolicyEngine, RateLimiter,
};

use crate::gate::Gate;

/// Builder for constructing a [`Gate`].
///
/// Any collaborator left unset is built from the configuration: a
/// file-backed policy engine, a file-backed audit logger, the manifest at the
/// configured path, and a passthrough executor.
pub struct GateBuilder {
    config: GateConfig,
    policy: Option<Arc<dyn PolicyEvaluator>>,
    audit: Option<Arc<dyn AuditSink>>,
    executor: Option<Arc<dyn Executor>>,
    manifest: Option<Arc<ConversionManifest>>,
    record_bindings: bool,
}

impl GateBuilder {
    /// Create a new builder from configuration.
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            policy: None,
            audit: None,
            executor: None,
            manifest: None,
            record_bindings: true,
        }
    }

    /// Set the policy evaluator.
    pub fn with_policy(mut self, policy: Arc<dyn PolicyEvaluator>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Set the executor.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the manifest that records bindings.
    pub fn with_manifest(mut self, manifest: Arc<ConversionManifest>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Do not record bindings in any manifest.
    pub fn without_manifest(mut self) -> Self {
        self.record_bindings = false;
        self.manifest = None;
        self
    }

    /// Build the gate.
    pub fn build(self) -> Result<Arc<Gate>> {
        self.config.validate()?;
        let config = self.config;

        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(PolicyEngine::new(config.policy.policy_dir.clone())));
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(ImmutableAuditLogger::new(config.audit.audit_dir.clone())));
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(PassthroughExecutor));
        let manifest = if self.record_bindings {
            Some(self.manifest.unwrap_or_else(|| {
                Arc::new(ConversionManifest::new(config.manifest.manifest_path.clone()))
            }))
        } else {
            None
        };

        tracing::info!(
            failure_threshold = config.circuit_breaker.failure_threshold,
            rate_per_second = config.rate_limiter.rate_per_second,
            bucket_size = config.rate_limiter.bucket_size,
            "Operative gate initialized"
        );

        Ok(Arc::new(Gate {
            circuit: CircuitBreaker::new(&config.circuit_breaker),
            limiter: RateLimiter::new(&config.rate_limiter),
            policy,
            audit,
            executor,
            manifest,
            bound: dashmap::DashSet::new(),
            confidence_threshold: config.policy.default_confidence_threshold,
            executor_timeout: config.executor.call_timeout(),
        }))
    }
}

impl Gate {
    /// Start building a gate.
    pub fn builder(config: GateConfig) -> GateBuilder {
        GateBuilder::new(config)
    }
}
