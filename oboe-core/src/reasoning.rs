//! Reasoning loop seam
//!
//! The language model is an external collaborator. The orchestrator hands
//! it the message, the available tools and the reports of earlier calls,
//! and gets back either tool calls or a reply.

use crate::profile::UserProfile;
use async_trait::async_trait;
use oboe_tools::{InvocationError, ToolDescriptor, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool as offered to the reasoner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl From<&ToolDescriptor> for ToolSpec {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.input.schema_json(),
        }
    }
}

/// A call the reasoner wants made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Reasoner-assigned id, echoed in the report
    pub call_id: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Failure classes reported back to the reasoner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum ToolFailureClass {
    AuthFailure,
    SchemaMismatch,
    Upstream { code: u16 },
    Timeout,
    /// Not in the turn's tool list; no call was made
    UnknownTool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    #[serde(flatten)]
    pub class: ToolFailureClass,
    pub message: String,
}

impl From<&InvocationError> for ToolFailure {
    fn from(err: &InvocationError) -> Self {
        let class = match err {
            InvocationError::AuthFailure(_) => ToolFailureClass::AuthFailure,
            InvocationError::SchemaMismatch(_) => ToolFailureClass::SchemaMismatch,
            InvocationError::UpstreamError { code, .. } => ToolFailureClass::Upstream { code: *code },
            InvocationError::Timeout(_) => ToolFailureClass::Timeout,
        };
        Self {
            class,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolCallOutcome {
    Success { result: ToolResult },
    Failed { failure: ToolFailure },
}

impl ToolCallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolCallOutcome::Success { .. })
    }
}

/// What happened to one requested call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallReport {
    pub call_id: String,
    pub tool: String,
    pub outcome: ToolCallOutcome,
    /// Network attempts made (0 when rejected locally)
    pub attempts: u8,
}

/// Input to one reasoning step
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub message: String,
    pub profile: Option<UserProfile>,
    pub tools: Vec<ToolSpec>,
    /// Reports of every call made so far for this message, in request order
    pub history: Vec<ToolCallReport>,
}

/// Output of one reasoning step
#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningStep {
    CallTools(Vec<ToolCallRequest>),
    Respond(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Reasoning failed: {0}")]
pub struct ReasoningError(pub String);

/// The reasoning loop
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn step(&self, request: ReasoningRequest) -> Result<ReasoningStep, ReasoningError>;
}
