//! Mock implementations of the collaborator traits for testing.
//!
//! Shared across crates so gate, governance and root integration tests drive
//! the same scripted agents and executors.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::{
    traits::{Agent, Executor},
    types::{AgentAnalysis, ExecutionContext, RiskLevel},
    Error, Result,
};

// =============================================================================
// Mock Agent
// =============================================================================

/// What a [`MockAgent`] does when called.
#[derive(Debug, Clone)]
pub enum AgentBehavior {
    /// Return this analysis.
    Respond(AgentAnalysis),
    /// Return `Error::Agent` with this message.
    Fail(String),
    /// Panic with this message.
    Panic(String),
}

/// Agent returning a fixed behavior and counting its calls.
pub struct MockAgent {
    name: String,
    behavior: Mutex<AgentBehavior>,
    calls: AtomicUsize,
}

impl MockAgent {
    pub fn new(name: &str, behavior: AgentBehavior) -> Self {
        Self {
            name: name.to_string(),
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
        }
    }

    /// Agent that echoes its input as analysis with the given confidence.
    pub fn confident(name: &str, confidence: f64) -> Self {
        Self::new(
            name,
            AgentBehavior::Respond(
                AgentAnalysis::new(serde_json::json!({ "summary": "ok" }))
                    .with_confidence(confidence),
            ),
        )
    }

    /// Agent reporting a risk level alongside its confidence.
    pub fn risky(name: &str, confidence: f64, risk: RiskLevel) -> Self {
        Self::new(
            name,
            AgentBehavior::Respond(
                AgentAnalysis::new(serde_json::json!({ "summary": "ok" }))
                    .with_confidence(confidence)
                    .with_risk(risk),
            ),
        )
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::new(name, AgentBehavior::Fail(message.to_string()))
    }

    pub fn set_behavior(&self, behavior: AgentBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, _ctx: &ExecutionContext, _input: &Value) -> Result<AgentAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            AgentBehavior::Respond(analysis) => Ok(analysis),
            AgentBehavior::Fail(msg) => Err(Error::agent(msg)),
            AgentBehavior::Panic(msg) => panic!("{}", msg),
        }
    }
}

// =============================================================================
// Mock Executor
// =============================================================================

/// Executor that replays a script of outcomes, then falls back to a default.
pub struct MockExecutor {
    script: Mutex<VecDeque<std::result::Result<Value, String>>>,
    default_ok: bool,
    calls: AtomicUsize,
    delay: Option<std::time::Duration>,
}

impl MockExecutor {
    /// Always succeeds with `{"executed": true}`.
    pub fn succeeding() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_ok: true,
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Always fails with `Error::Executor`.
    pub fn failing() -> Self {
        Self {
            default_ok: false,
            ..Self::succeeding()
        }
    }

    /// Queue explicit outcomes consumed before the default applies.
    pub fn with_script(self, outcomes: Vec<std::result::Result<Value, String>>) -> Self {
        *self.script.lock().unwrap() = outcomes.into();
        self
    }

    /// Sleep before answering, to exercise deadlines.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(
        &self,
        action_type: &str,
        _payload: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(v)) => Ok(v),
            Some(Err(msg)) => Err(Error::executor(msg)),
            None if self.default_ok => Ok(serde_json::json!({ "executed": true, "action": action_type })),
            None => Err(Error::executor(format!("{} failed", action_type))),
        }
    }
}
