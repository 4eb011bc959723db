//! Scripted reasoners

use async_trait::async_trait;
use oboe_core::{Reasoner, ReasoningError, ReasoningRequest, ReasoningStep, ToolCallRequest};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a fixed list of steps and records every request it sees.
/// Once the script runs out it answers "Done."
#[derive(Default)]
pub struct ScriptedReasoner {
    steps: Mutex<VecDeque<ReasoningStep>>,
    requests: Mutex<Vec<ReasoningRequest>>,
    delay: Option<Duration>,
}

impl ScriptedReasoner {
    pub fn new(steps: impl IntoIterator<Item = ReasoningStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Default::default()
        })
    }

    /// A reasoner that answers "Done." to everything
    pub fn idle() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A reasoner that sleeps for `delay` before every step
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn step(&self, request: ReasoningRequest) -> Result<ReasoningStep, ReasoningError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.requests.lock().expect("requests lock").push(request);
        let next = self.steps.lock().expect("steps lock").pop_front();
        Ok(next.unwrap_or_else(|| ReasoningStep::Respond("Done.".to_string())))
    }
}

/// One tool call
pub fn call(call_id: &str, tool: &str, arguments: Value) -> ToolCallRequest {
    ToolCallRequest {
        call_id: call_id.to_string(),
        tool: tool.to_string(),
        arguments,
    }
}
