//! End-to-end tests of the gated pipeline.
//!
//! Every test runs against a temp directory holding policies, audit logs and
//! the manifest, with scripted agents and executors from `operative_core::mocks`.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use operative_core::{
    config::GateConfig,
    mocks::{AgentBehavior, MockAgent, MockExecutor},
    traits::Agent,
    types::{AgentAnalysis, AutonomyLevel, ExecutionContext, OperativeStatus, RiskLevel},
};
use operative_gate::{Gate, IntoOperative, OperativeRequest};
use operative_governance::{
    BreakerState, ConversionManifest, ImmutableAuditLogger, PolicyDocument, PolicyEngine,
};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    _dir: TempDir,
    gate: Arc<Gate>,
    executor: Arc<MockExecutor>,
    policy: Arc<PolicyEngine>,
    audit: Arc<ImmutableAuditLogger>,
    manifest: Arc<ConversionManifest>,
}

fn config_in(dir: &Path) -> GateConfig {
    let mut config = GateConfig::default();
    config.policy.policy_dir = dir.join("policies");
    config.audit.audit_dir = dir.join("audit_logs");
    config.manifest.manifest_path = dir.join("manifest").join("conversions.jsonl");
    config
}

fn harness_with(executor: MockExecutor, tweak: impl FnOnce(&mut GateConfig)) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    tweak(&mut config);

    let executor = Arc::new(executor);
    let policy = Arc::new(PolicyEngine::new(config.policy.policy_dir.clone()));
    let audit = Arc::new(ImmutableAuditLogger::new(config.audit.audit_dir.clone()));
    let manifest = Arc::new(ConversionManifest::new(config.manifest.manifest_path.clone()));

    let gate = Gate::builder(config)
        .with_executor(executor.clone())
        .with_policy(policy.clone())
        .with_audit(audit.clone())
        .with_manifest(manifest.clone())
        .build()
        .unwrap();

    Harness {
        _dir: dir,
        gate,
        executor,
        policy,
        audit,
        manifest,
    }
}

fn harness() -> Harness {
    harness_with(MockExecutor::succeeding(), |_| {})
}

fn publish(tenant: &str, content: &str) -> OperativeRequest {
    OperativeRequest::new(tenant, json!({ "content": content })).action("publish_content")
}

/// Total records and chain validity across every day logged for a tenant.
fn audit_summary(audit: &ImmutableAuditLogger, tenant: &str) -> (usize, bool) {
    let mut total = 0;
    let mut valid = true;
    for day in audit.days(tenant).unwrap() {
        total += audit.entries(tenant, day).unwrap().len();
        valid &= audit.verify_chain(tenant, day).unwrap().valid;
    }
    (total, valid)
}

// =============================================================================
// Core scenarios
// =============================================================================

#[tokio::test]
async fn test_confident_call_executes() {
    let h = harness();
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    let result = agent
        .execute_operative(publish("bank_a", "Quarterly results are out"))
        .await;

    assert_eq!(result.status, OperativeStatus::Success);
    assert!(result.ok);
    assert_eq!(result.reason, "executed");
    assert_eq!(result.data["executed"], true);
    assert_eq!(result.audit_hash.as_ref().map(|h| h.len()), Some(64));
    assert_eq!(h.executor.call_count(), 1);

    let circuit = h
        .gate
        .circuit_breaker()
        .snapshot("bank_a", "publish_content")
        .unwrap();
    assert_eq!(circuit.state, BreakerState::Closed);
    assert_eq!(circuit.consecutive_failures, 0);
}

#[tokio::test]
async fn test_blocked_keyword_denies_without_touching_circuit() {
    let h = harness();
    h.policy.set_policy(
        "bank_a",
        PolicyDocument {
            blocked_keywords: vec!["spam".into()],
            ..Default::default()
        },
    );
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    let result = agent
        .execute_operative(publish("bank_a", "Buy SPAM now"))
        .await;

    assert_eq!(result.status, OperativeStatus::BlockedByPolicy);
    assert_eq!(result.reason, "blocked_keyword:spam");
    assert!(result.is_blocked());
    assert!(!result.needs_approval());
    assert!(result.audit_hash.is_some());
    assert_eq!(h.executor.call_count(), 0);

    let circuit = h
        .gate
        .circuit_breaker()
        .snapshot("bank_a", "publish_content")
        .unwrap();
    assert_eq!(circuit.state, BreakerState::Closed);
    assert_eq!(circuit.consecutive_failures, 0);
}

#[tokio::test]
async fn test_repeated_executor_failures_open_circuit() {
    let h = harness_with(MockExecutor::failing(), |_| {});
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    for _ in 0..5 {
        let result = agent.execute_operative(publish("bank_a", "hello")).await;
        assert_eq!(result.status, OperativeStatus::Failed);
        assert_eq!(result.reason, "execution_failed");
        assert_eq!(
            result.error.as_ref().map(|e| e.error_type.as_str()),
            Some("ExecutorError")
        );
    }

    let sixth = agent.execute_operative(publish("bank_a", "hello")).await;
    assert_eq!(sixth.status, OperativeStatus::BlockedByCircuit);
    assert_eq!(sixth.reason, "circuit_open");
    assert_eq!(sixth.data["circuit_state"], "open");
    assert_eq!(h.executor.call_count(), 5);

    // Another tenant has its own circuit.
    let other = agent.execute_operative(publish("bank_b", "hello")).await;
    assert_eq!(other.status, OperativeStatus::Failed);
    assert_eq!(h.executor.call_count(), 6);
}

#[tokio::test]
async fn test_circuit_recovers_after_timeout() {
    let executor = MockExecutor::succeeding()
        .with_script(vec![Err("down".into()), Err("down".into())]);
    let h = harness_with(executor, |c| {
        c.circuit_breaker.failure_threshold = 2;
        c.circuit_breaker.recovery_timeout_ms = 50;
    });
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    for _ in 0..2 {
        let result = agent.execute_operative(publish("bank_a", "x")).await;
        assert_eq!(result.status, OperativeStatus::Failed);
    }
    let blocked = agent.execute_operative(publish("bank_a", "x")).await;
    assert_eq!(blocked.status, OperativeStatus::BlockedByCircuit);

    tokio::time::sleep(Duration::from_millis(120)).await;

    let trial = agent.execute_operative(publish("bank_a", "x")).await;
    assert_eq!(trial.status, OperativeStatus::Success);
    let circuit = h
        .gate
        .circuit_breaker()
        .snapshot("bank_a", "publish_content")
        .unwrap();
    assert_eq!(circuit.state, BreakerState::Closed);
}

#[tokio::test]
async fn test_half_open_slots_denied_before_executor_are_returned() {
    let executor = MockExecutor::succeeding().with_script(vec![Err("down".into())]);
    let h = harness_with(executor, |c| {
        c.circuit_breaker.failure_threshold = 1;
        c.circuit_breaker.recovery_timeout_ms = 20;
        c.circuit_breaker.half_open_max_calls = 3;
    });
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    let failed = agent.execute_operative(publish("bank_a", "x")).await;
    assert_eq!(failed.status, OperativeStatus::Failed);
    tokio::time::sleep(Duration::from_millis(40)).await;

    // More policy-denied calls than the half-open budget.
    for _ in 0..5 {
        let pending = agent
            .execute_operative(publish("bank_a", "x").autonomy(AutonomyLevel::Manual))
            .await;
        assert_eq!(pending.status, OperativeStatus::PendingApproval);
    }
    let circuit = h
        .gate
        .circuit_breaker()
        .snapshot("bank_a", "publish_content")
        .unwrap();
    assert_eq!(circuit.state, BreakerState::HalfOpen);
    assert_eq!(circuit.half_open_calls, 0);

    let trial = agent.execute_operative(publish("bank_a", "x")).await;
    assert_eq!(trial.status, OperativeStatus::Success);
    let circuit = h
        .gate
        .circuit_breaker()
        .snapshot("bank_a", "publish_content")
        .unwrap();
    assert_eq!(circuit.state, BreakerState::Closed);
    assert_eq!(h.executor.call_count(), 2);
}

#[tokio::test]
async fn test_rate_limited_half_open_call_returns_slot() {
    let executor = MockExecutor::succeeding().with_script(vec![Err("down".into())]);
    let h = harness_with(executor, |c| {
        c.circuit_breaker.failure_threshold = 1;
        c.circuit_breaker.recovery_timeout_ms = 20;
        c.circuit_breaker.half_open_max_calls = 1;
        c.rate_limiter.bucket_size = 1.0;
        c.rate_limiter.rate_per_second = 0.01;
    });
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    agent.execute_operative(publish("bank_a", "x")).await;
    tokio::time::sleep(Duration::from_millis(40)).await;

    for _ in 0..3 {
        let limited = agent.execute_operative(publish("bank_a", "x")).await;
        assert_eq!(limited.status, OperativeStatus::RateLimited);
    }
    let circuit = h
        .gate
        .circuit_breaker()
        .snapshot("bank_a", "publish_content")
        .unwrap();
    assert_eq!(circuit.half_open_calls, 0);
    assert_eq!(h.executor.call_count(), 1);
}

#[tokio::test]
async fn test_tenant_ids_with_separators_stay_isolated() {
    let h = harness_with(MockExecutor::failing(), |c| {
        c.circuit_breaker.failure_threshold = 1;
    });
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    let failed = agent
        .execute_operative(OperativeRequest::new("acme:eu", json!({})).action("publish"))
        .await;
    assert_eq!(failed.status, OperativeStatus::Failed);
    let blocked = agent
        .execute_operative(OperativeRequest::new("acme:eu", json!({})).action("publish"))
        .await;
    assert_eq!(blocked.status, OperativeStatus::BlockedByCircuit);

    let other = agent
        .execute_operative(OperativeRequest::new("acme", json!({})).action("eu:publish"))
        .await;
    assert_eq!(other.status, OperativeStatus::Failed);
}

#[tokio::test]
async fn test_lookalike_tenants_keep_separate_audit_and_policy() {
    let h = harness();
    h.policy.set_policy(
        "bank/a",
        PolicyDocument {
            blocked_keywords: vec!["hello".into()],
            ..Default::default()
        },
    );
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    let blocked = agent.execute_operative(publish("bank/a", "hello")).await;
    assert_eq!(blocked.status, OperativeStatus::BlockedByPolicy);
    for tenant in ["bank_a", "bank a"] {
        let ok = agent.execute_operative(publish(tenant, "hello")).await;
        assert_eq!(ok.status, OperativeStatus::Success, "tenant {:?}", tenant);
    }

    for tenant in ["bank/a", "bank_a", "bank a"] {
        let (total, valid) = audit_summary(&h.audit, tenant);
        assert_eq!(total, 1, "tenant {:?}", tenant);
        assert!(valid, "tenant {:?}", tenant);
    }
}

// =============================================================================
// Agent failures
// =============================================================================

#[tokio::test]
async fn test_agent_error_leaves_state_untouched() {
    let h = harness();
    let agent = Arc::new(MockAgent::failing("lead_scorer", "model file missing")).bind(&h.gate);

    let result = agent.execute_operative(publish("bank_a", "x")).await;

    assert_eq!(result.status, OperativeStatus::Error);
    assert_eq!(result.reason, "agent_error");
    let error = result.error.unwrap();
    assert_eq!(error.error_type, "AgentError");
    assert!(error.trace.contains("model file missing"));
    assert!(result.audit_hash.is_some());
    assert_eq!(h.gate.circuit_breaker().tracked_keys(), 0);
    assert_eq!(h.gate.rate_limiter().tracked_keys(), 0);
    assert_eq!(h.executor.call_count(), 0);
}

#[tokio::test]
async fn test_agent_panic_becomes_error_result() {
    let h = harness();
    let mock = Arc::new(MockAgent::confident("lead_scorer", 0.9));
    mock.set_behavior(AgentBehavior::Panic("index out of range".into()));
    let agent = mock.clone().bind(&h.gate);

    let result = agent.execute_operative(publish("bank_a", "x")).await;

    assert_eq!(result.status, OperativeStatus::Error);
    let error = result.error.unwrap();
    assert_eq!(error.error_type, "panic");
    assert!(error.trace.contains("index out of range"));
    assert_eq!(mock.call_count(), 1);
    assert_eq!(h.gate.circuit_breaker().tracked_keys(), 0);
}

// =============================================================================
// Rate, approval and deadline paths
// =============================================================================

#[tokio::test]
async fn test_drained_bucket_rate_limits() {
    let h = harness_with(MockExecutor::succeeding(), |c| {
        c.rate_limiter.bucket_size = 2.0;
        c.rate_limiter.rate_per_second = 0.01;
    });
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    for _ in 0..2 {
        let ok = agent.execute_operative(publish("bank_a", "x")).await;
        assert_eq!(ok.status, OperativeStatus::Success);
    }
    let limited = agent.execute_operative(publish("bank_a", "x")).await;

    assert_eq!(limited.status, OperativeStatus::RateLimited);
    assert!(limited.is_blocked());
    assert!(limited.data["wait_seconds"].as_f64().unwrap() > 0.0);
    assert_eq!(h.executor.call_count(), 2);
}

#[tokio::test]
async fn test_manual_autonomy_requires_approval() {
    let h = harness();
    let agent = Arc::new(MockAgent::confident("credit_risk", 0.95)).bind(&h.gate);

    let result = agent
        .execute_operative(publish("bank_a", "x").autonomy(AutonomyLevel::Manual))
        .await;

    assert_eq!(result.status, OperativeStatus::PendingApproval);
    assert!(result.needs_approval());
    assert!(!result.ok);
    assert_eq!(result.reason, "manual_approval_required");
    assert_eq!(result.data["analysis"]["summary"], "ok");
    assert_eq!(h.executor.call_count(), 0);
}

#[tokio::test]
async fn test_low_confidence_and_high_risk_need_approval() {
    let h = harness();

    let unsure = Arc::new(MockAgent::confident("churn", 0.3)).bind(&h.gate);
    let result = unsure.execute_operative(publish("bank_a", "x")).await;
    assert_eq!(result.status, OperativeStatus::PendingApproval);
    assert_eq!(result.reason, "low_confidence");

    let risky = Arc::new(MockAgent::risky("fraud", 0.8, RiskLevel::High)).bind(&h.gate);
    let result = risky.execute_operative(publish("bank_a", "x")).await;
    assert_eq!(result.status, OperativeStatus::PendingApproval);
    assert_eq!(result.reason, "high_risk_requires_approval");
    assert_eq!(result.risk_level, Some(RiskLevel::High));

    assert_eq!(h.executor.call_count(), 0);
}

#[tokio::test]
async fn test_caller_confidence_overrides_agent() {
    let h = harness();
    let agent = Arc::new(MockAgent::confident("churn", 0.3)).bind(&h.gate);

    let result = agent
        .execute_operative(publish("bank_a", "x").confidence(0.95))
        .await;

    assert_eq!(result.status, OperativeStatus::Success);
    assert_eq!(result.confidence, 0.95);
}

#[tokio::test]
async fn test_slow_executor_times_out_and_counts_as_failure() {
    let executor = MockExecutor::succeeding().with_delay(Duration::from_millis(500));
    let h = harness_with(executor, |c| c.executor.call_timeout_ms = Some(50));
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    let result = agent.execute_operative(publish("bank_a", "x")).await;

    assert_eq!(result.status, OperativeStatus::Timeout);
    assert_eq!(result.reason, "executor_timeout");
    let circuit = h
        .gate
        .circuit_breaker()
        .snapshot("bank_a", "publish_content")
        .unwrap();
    assert_eq!(circuit.consecutive_failures, 1);
}

#[tokio::test]
async fn test_malformed_policy_fails_closed() {
    let h = harness();
    let path = h.policy.policy_path("bank_a");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    let result = agent.execute_operative(publish("bank_a", "x")).await;

    assert_eq!(result.status, OperativeStatus::Error);
    assert_eq!(result.reason, "policy_evaluation_error");
    assert_eq!(h.executor.call_count(), 0);
}

#[tokio::test]
async fn test_default_action_and_correlation_id() {
    let h = harness();
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);

    let given = agent
        .execute_operative(OperativeRequest::new("bank_a", json!("raw text")).correlation_id("req-42"))
        .await;
    assert_eq!(given.correlation_id, "req-42");
    assert!(h.gate.circuit_breaker().snapshot("bank_a", "analyze").is_some());

    let generated = agent
        .execute_operative(OperativeRequest::new("bank_a", json!("raw text")))
        .await;
    assert!(!generated.correlation_id.is_empty());
    assert_ne!(generated.correlation_id, "req-42");
}

// =============================================================================
// Audit trail and bindings
// =============================================================================

#[tokio::test]
async fn test_every_path_audited_once_and_chain_verifies() {
    let h = harness();
    h.policy.set_policy(
        "bank_a",
        PolicyDocument {
            blocked_keywords: vec!["spam".into()],
            ..Default::default()
        },
    );
    let good = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);
    let broken = Arc::new(MockAgent::failing("broken", "boom")).bind(&h.gate);

    let mut last_hash = None;
    for result in [
        good.execute_operative(publish("bank_a", "fine")).await,
        good.execute_operative(publish("bank_a", "spam")).await,
        broken.execute_operative(publish("bank_a", "fine")).await,
        good.execute_operative(publish("bank_a", "fine").autonomy(AutonomyLevel::Manual))
            .await,
    ] {
        assert!(result.audit_hash.is_some());
        last_hash = result.audit_hash;
    }

    let (total, valid) = audit_summary(&h.audit, "bank_a");
    assert_eq!(total, 4);
    assert!(valid);

    let day = *h.audit.days("bank_a").unwrap().last().unwrap();
    let records = h.audit.entries("bank_a", day).unwrap();
    let last = records.last().unwrap();
    assert_eq!(Some(last.hash.clone()), last_hash);
    assert_eq!(last.event["event"], "pending_approval");
    assert_eq!(last.event["actor"], "content_scorer");
    assert_eq!(last.event["input_sha256"].as_str().map(str::len), Some(64));
}

#[tokio::test]
async fn test_bind_is_idempotent() {
    let h = harness();
    let mock = Arc::new(MockAgent::confident("content_scorer", 0.9));

    let first = mock.clone().bind(&h.gate);
    let again = mock.clone().bind(&h.gate);
    let rebound = first.clone().bind(&h.gate);

    assert_eq!(again.agent().name(), "content_scorer");
    assert!(Arc::ptr_eq(rebound.gate(), &h.gate));
    assert_eq!(h.manifest.len().unwrap(), 1);
    let entries = h.manifest.entries().unwrap();
    assert_eq!(entries[0]["action"], "agent_bound");
    assert_eq!(entries[0]["target"], "content_scorer");
}

/// Same name as another agent but a different default action.
struct RenamedScorer;

#[async_trait]
impl Agent for RenamedScorer {
    fn name(&self) -> &str {
        "content_scorer"
    }

    fn default_action(&self) -> &str {
        "score_content"
    }

    async fn analyze(
        &self,
        _ctx: &ExecutionContext,
        _input: &Value,
    ) -> operative_core::Result<AgentAnalysis> {
        Ok(AgentAnalysis::new(json!({})).with_confidence(0.9))
    }
}

#[tokio::test]
async fn test_same_name_different_default_action_is_recorded() {
    let h = harness();
    let _first = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);
    let _second = Arc::new(RenamedScorer).bind(&h.gate);
    let _again = Arc::new(RenamedScorer).bind(&h.gate);

    let entries = h.manifest.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["details"]["default_action"], "score_content");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tenants_keep_separate_chains() {
    let h = harness();
    let agent = Arc::new(MockAgent::confident("content_scorer", 0.9)).bind(&h.gate);
    let tenants = ["bank_a", "bank_b", "bank_c", "bank_d"];

    let mut handles = Vec::new();
    for tenant in tenants {
        for i in 0..10 {
            let agent = agent.clone();
            handles.push(tokio::spawn(async move {
                agent
                    .execute_operative(publish(tenant, &format!("message {}", i)))
                    .await
            }));
        }
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().status, OperativeStatus::Success);
    }

    for tenant in tenants {
        let (total, valid) = audit_summary(&h.audit, tenant);
        assert_eq!(total, 10, "tenant {}", tenant);
        assert!(valid, "tenant {}", tenant);
    }
    assert_eq!(h.executor.call_count(), 40);
    assert_eq!(h.gate.circuit_breaker().tracked_keys(), 4);
}
