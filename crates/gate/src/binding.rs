//! Attaching agents to the gate.

use std::sync::Arc;

use operative_core::{traits::Agent, types::OperativeResult};

use crate::gate::Gate;
use crate::request::OperativeRequest;

/// An agent whose analysis calls are routed through a [`Gate`].
#[derive(Clone)]
pub struct BoundAgent {
    agent: Arc<dyn Agent>,
    gate: Arc<Gate>,
}

impl BoundAgent {
    /// Gated entrypoint: analysis, circuit, rate, policy, execution, audit.
    pub async fn execute_operative(&self, request: OperativeRequest) -> OperativeResult {
        self.gate.execute(self.agent.as_ref(), request).await
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }
}

impl std::fmt::Debug for BoundAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundAgent")
            .field("agent", &self.agent.name())
            .finish()
    }
}

impl Gate {
    /// Bind a type-erased agent.
    pub fn bind(self: &Arc<Self>, agent: Arc<dyn Agent>) -> BoundAgent {
        self.register_binding(agent.as_ref());
        BoundAgent {
            agent,
            gate: self.clone(),
        }
    }
}

/// Conversion into a gated agent. Binding an already bound agent returns it
/// unchanged.
pub trait IntoOperative {
    fn bind(self, gate: &Arc<Gate>) -> BoundAgent;
}

impl<A: Agent + 'static> IntoOperative for Arc<A> {
    fn bind(self, gate: &Arc<Gate>) -> BoundAgent {
        Gate::bind(gate, self)
    }
}

impl IntoOperative for BoundAgent {
    fn bind(self, _gate: &Arc<Gate>) -> BoundAgent {
        self
    }
}
