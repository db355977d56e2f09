//! The Operative Gate pipeline.
//!
//! Agent call → circuit check → rate check → policy check → executor call →
//! outcome recording. Each step is final on failure, and every path ends in
//! exactly one audit record and one [`OperativeResult`].

use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use operative_core::{
    canonical::to_canonical_string,
    integrity::sha256_hex,
    traits::{Agent, AuditSink, Executor, PolicyEvaluator},
    types::{
        AgentAnalysis, ErrorDetail, ExecutionContext, OperativeResult, OperativeStatus, RiskLevel,
    },
};
use operative_governance::{
    track_decision, CircuitBreaker, ConversionManifest, ManifestEntry, RateLimiter,
};

use crate::request::OperativeRequest;

/// Process-wide execution-control layer shared by every bound agent.
pub struct Gate {
    pub(crate) circuit: CircuitBreaker,
    pub(crate) limiter: RateLimiter,
    pub(crate) policy: Arc<dyn PolicyEvaluator>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) manifest: Option<Arc<ConversionManifest>>,
    /// `(agent name, default action)` of every agent bound so far.
    pub(crate) bound: dashmap::DashSet<(String, String)>,
    pub(crate) confidence_threshold: f64,
    pub(crate) executor_timeout: Option<Duration>,
}

/// What a pipeline stage decided, before it is audited.
struct Outcome {
    status: OperativeStatus,
    event: &'static str,
    reason: String,
    data: Value,
    details: Value,
    error: Option<ErrorDetail>,
}

impl Outcome {
    fn new(status: OperativeStatus, event: &'static str, reason: impl Into<String>) -> Self {
        Self {
            status,
            event,
            reason: reason.into(),
            data: Value::Null,
            details: Value::Null,
            error: None,
        }
    }

    fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    fn error(mut self, error: ErrorDetail) -> Self {
        self.error = Some(error);
        self
    }
}

/// Analysis facts the later stages and the audit record need.
struct Assessed {
    confidence: f64,
    risk_level: Option<RiskLevel>,
}

impl Gate {
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Record a first-time binding in the manifest; later bindings of an
    /// agent with the same name and default action are no-ops.
    pub(crate) fn register_binding(&self, agent: &dyn Agent) {
        let identity = (agent.name().to_string(), agent.default_action().to_string());
        if !self.bound.insert(identity) {
            tracing::debug!(agent = agent.name(), "Agent already bound");
            return;
        }
        tracing::info!(agent = agent.name(), "Agent bound to operative gate");
        if let Some(manifest) = &self.manifest {
            let entry = ManifestEntry::new(
                "agent_bound",
                agent.name(),
                json!({ "default_action": agent.default_action() }),
            );
            if let Err(e) = manifest.append(&entry) {
                tracing::error!(agent = agent.name(), error = %e, "Failed to record binding in manifest");
            }
        }
    }

    /// Run one gated invocation of `agent`. Never fails: every failure mode
    /// becomes a typed result.
    pub async fn execute(&self, agent: &dyn Agent, request: OperativeRequest) -> OperativeResult {
        let started = Instant::now();
        let action = request
            .action_type
            .clone()
            .unwrap_or_else(|| agent.default_action().to_string());
        let ctx = ExecutionContext::builder(request.tenant_id.clone(), action)
            .correlation_id(request.correlation_id.clone())
            .autonomy_level(request.autonomy_level)
            .confidence_threshold(self.confidence_threshold)
            .build();

        let span = tracing::info_span!(
            "execute_operative",
            tenant_id = %ctx.tenant_id,
            action = %ctx.action_type,
            correlation_id = %ctx.correlation_id,
            agent = agent.name(),
        );

        async {
            let (outcome, assessed) = self.run_pipeline(agent, &ctx, &request).await;
            self.finish(agent, &ctx, &request.input, outcome, assessed, started)
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(
        &self,
        agent: &dyn Agent,
        ctx: &ExecutionContext,
        request: &OperativeRequest,
    ) -> (Outcome, Assessed) {
        let tenant = ctx.tenant_id.as_str();
        let action = ctx.action_type.as_str();

        // 1. Agent analysis. Circuit and rate state stay untouched on failure.
        let analysis = match AssertUnwindSafe(agent.analyze(ctx, &request.input))
            .catch_unwind()
            .await
        {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Agent analysis failed");
                let outcome = Outcome::new(OperativeStatus::Error, "agent_execution_error", "agent_error")
                    .error(ErrorDetail::new(e.kind(), &e.to_string()));
                return (outcome, self.assess(request, None));
            }
            Err(panic) => {
                tracing::error!("Agent analysis panicked");
                let outcome = Outcome::new(OperativeStatus::Error, "agent_execution_error", "agent_error")
                    .error(ErrorDetail::new("panic", &panic_message(panic.as_ref())));
                return (outcome, self.assess(request, None));
            }
        };
        let assessed = self.assess(request, Some(&analysis));

        // 2. Circuit breaker. A blocked call is not a new failure. Every exit
        // between here and the executor hands a half-open slot back.
        let circuit = self.circuit.allow(tenant, action);
        if !circuit.allowed {
            tracing::info!(state = circuit.state.as_str(), "Blocked by circuit breaker");
            let outcome = Outcome::new(
                OperativeStatus::BlockedByCircuit,
                "blocked_by_circuit",
                circuit.reason,
            )
            .data(json!({ "circuit_state": circuit.state }))
            .details(json!({ "circuit_state": circuit.state }));
            return (outcome, assessed);
        }

        // 3. Rate limiter.
        let rate = self.limiter.allow(tenant, action);
        if !rate.granted {
            self.circuit.release_half_open_slot(tenant, action);
            tracing::info!(wait_seconds = rate.wait_seconds, "Rate limited");
            let outcome = Outcome::new(OperativeStatus::RateLimited, "rate_limited", "rate_limited")
                .data(json!({ "wait_seconds": rate.wait_seconds }))
                .details(json!({ "wait_seconds": rate.wait_seconds }));
            return (outcome, assessed);
        }

        // 4. Policy. Evaluation errors fail closed.
        let payload = merge_payload(&request.input, &analysis, &assessed);
        let decision = match self
            .policy
            .evaluate(agent.name(), ctx, &payload, assessed.confidence)
        {
            Ok(decision) => decision,
            Err(e) => {
                self.circuit.release_half_open_slot(tenant, action);
                tracing::error!(error = %e, "Policy evaluation failed");
                let outcome = Outcome::new(
                    OperativeStatus::Error,
                    "policy_evaluation_error",
                    "policy_evaluation_error",
                )
                .error(ErrorDetail::new(e.kind(), &e.to_string()));
                return (outcome, assessed);
            }
        };
        if !decision.allowed {
            self.circuit.release_half_open_slot(tenant, action);
            let (status, event) = if decision.approval_eligible {
                (OperativeStatus::PendingApproval, "pending_approval")
            } else {
                (OperativeStatus::BlockedByPolicy, "blocked_by_policy")
            };
            tracing::info!(reason = %decision.reason, status = status.as_str(), "Policy denied execution");
            let data = if decision.approval_eligible {
                json!({ "analysis": analysis.data, "policy": decision.metadata })
            } else {
                json!({ "policy": decision.metadata })
            };
            let outcome = Outcome::new(status, event, decision.reason)
                .data(data)
                .details(json!({ "policy": decision.metadata }));
            return (outcome, assessed);
        }

        // 5. Executor.
        let call = AssertUnwindSafe(self.executor.execute(action, &payload, ctx)).catch_unwind();
        let executed = match self.executor_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.ok(),
            None => Some(call.await),
        };

        let outcome = match executed {
            Some(Ok(Ok(result))) => {
                self.circuit.record_success(tenant, action);
                Outcome::new(OperativeStatus::Success, "execution_success", "executed")
                    .data(result)
                    .details(json!({ "policy": decision.metadata }))
            }
            Some(Ok(Err(e))) => {
                self.circuit.record_failure(tenant, action);
                tracing::warn!(error = %e, "Executor failed");
                Outcome::new(OperativeStatus::Failed, "execution_failed", "execution_failed")
                    .error(ErrorDetail::new(e.kind(), &e.to_string()))
            }
            Some(Err(panic)) => {
                self.circuit.record_failure(tenant, action);
                tracing::error!("Executor panicked");
                Outcome::new(OperativeStatus::Failed, "execution_failed", "execution_failed")
                    .error(ErrorDetail::new("panic", &panic_message(panic.as_ref())))
            }
            None => {
                self.circuit.record_failure(tenant, action);
                let limit_ms = self.executor_timeout.map_or(0, |d| d.as_millis());
                tracing::warn!(limit_ms = limit_ms as u64, "Executor timed out");
                Outcome::new(OperativeStatus::Timeout, "execution_timeout", "executor_timeout")
                    .details(json!({ "timeout_ms": limit_ms as u64 }))
            }
        };
        (outcome, assessed)
    }

    /// Caller-supplied confidence wins over the agent's own.
    fn assess(&self, request: &OperativeRequest, analysis: Option<&AgentAnalysis>) -> Assessed {
        let reported = analysis.map(|a| a.effective_confidence()).unwrap_or(0.0);
        let confidence = request
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(reported);
        Assessed {
            confidence,
            risk_level: analysis.and_then(|a| a.risk_level),
        }
    }

    /// Audit the outcome and produce the caller-facing result.
    fn finish(
        &self,
        agent: &dyn Agent,
        ctx: &ExecutionContext,
        input: &Value,
        outcome: Outcome,
        assessed: Assessed,
        started: Instant,
    ) -> OperativeResult {
        let decided_ms = started.elapsed().as_secs_f64() * 1000.0;
        let input_sha256 = to_canonical_string(input)
            .map(|s| sha256_hex(s.as_bytes()))
            .unwrap_or_default();

        let mut event = json!({
            "event": outcome.event,
            "status": outcome.status,
            "reason": outcome.reason,
            "tenant_id": ctx.tenant_id,
            "correlation_id": ctx.correlation_id,
            "action_type": ctx.action_type,
            "autonomy_level": ctx.autonomy_level,
            "actor": agent.name(),
            "confidence": assessed.confidence,
            "risk_level": assessed.risk_level,
            "input_sha256": input_sha256,
            "context_timestamp": ctx.timestamp.to_rfc3339(),
            "execution_time_ms": decided_ms,
            "details": outcome.details,
        });
        if let Some(error) = &outcome.error {
            event["error"] = json!(error);
        }

        let audit_hash = match self.audit.log(&ctx.tenant_id, &event) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::error!(error = %e, "Failed to write audit record");
                None
            }
        };

        let elapsed = started.elapsed();
        track_decision(outcome.status.as_str(), &ctx.action_type, elapsed.as_secs_f64());
        tracing::info!(
            status = outcome.status.as_str(),
            reason = %outcome.reason,
            elapsed_ms = elapsed.as_millis() as u64,
            "Operative call finished"
        );

        OperativeResult {
            ok: outcome.status == OperativeStatus::Success,
            status: outcome.status,
            reason: outcome.reason,
            data: outcome.data,
            audit_hash,
            correlation_id: ctx.correlation_id.clone(),
            execution_time_ms: elapsed.as_secs_f64() * 1000.0,
            confidence: assessed.confidence,
            risk_level: assessed.risk_level,
            error: outcome.error,
        }
    }
}

/// Payload seen by the policy engine and the executor: the caller's input
/// fields at top level, the agent's analysis under `analysis`, and the
/// assessed confidence and risk.
fn merge_payload(input: &Value, analysis: &AgentAnalysis, assessed: &Assessed) -> Value {
    let mut merged = match input {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("input".into(), other.clone());
            map
        }
    };
    merged.insert("analysis".into(), analysis.data.clone());
    merged.insert("confidence".into(), json!(assessed.confidence));
    if let Some(risk) = assessed.risk_level {
        merged.insert("risk_level".into(), json!(risk));
    }
    Value::Object(merged)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
