//! Collaborator traits wrapped by the gate.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{AgentAnalysis, ExecutionContext};

/// A business-logic module that can be put behind the gate.
///
/// Every scoring / forecasting module exposes exactly this one analysis
/// capability. Synchronous modules simply return without awaiting.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Name recorded as the actor in policy metadata and audit events.
    fn name(&self) -> &str;

    /// Action used when the caller does not name one.
    fn default_action(&self) -> &str {
        "analyze"
    }

    /// Run the analysis for one gated call.
    async fn analyze(&self, ctx: &ExecutionContext, input: &Value) -> Result<AgentAnalysis>;
}

/// Performs the side-effecting action once every gate check has passed.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        action_type: &str,
        payload: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value>;
}

/// Adapts a synchronous closure into an [`Agent`].
pub struct FnAgent<F> {
    name: String,
    func: F,
}

impl<F> FnAgent<F>
where
    F: Fn(&ExecutionContext, &Value) -> Result<AgentAnalysis> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Agent for FnAgent<F>
where
    F: Fn(&ExecutionContext, &Value) -> Result<AgentAnalysis> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, ctx: &ExecutionContext, input: &Value) -> Result<AgentAnalysis> {
        (self.func)(ctx, input)
    }
}

/// Executor that performs no side effect and echoes its payload back.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExecutor;

#[async_trait]
impl Executor for PassthroughExecutor {
    async fn execute(
        &self,
        action_type: &str,
        payload: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value> {
        Ok(serde_json::json!({
            "action": action_type,
            "payload": payload,
        }))
    }
}
