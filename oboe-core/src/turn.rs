//! Turn state and per-turn context

use crate::profile::UserProfile;
use crate::reasoning::ToolCallReport;
use oboe_auth::{ExchangedToken, Principal};
use oboe_common::Failure;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// States of one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Start,
    Authenticating,
    ConsentCheck,
    TokenResolution,
    ToolAssembly,
    Reasoning,
    ToolDispatch,
    Responding,
    Done,
    Aborted,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Start => "start",
            TurnState::Authenticating => "authenticating",
            TurnState::ConsentCheck => "consent_check",
            TurnState::TokenResolution => "token_resolution",
            TurnState::ToolAssembly => "tool_assembly",
            TurnState::Reasoning => "reasoning",
            TurnState::ToolDispatch => "tool_dispatch",
            TurnState::Responding => "responding",
            TurnState::Done => "done",
            TurnState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Done | TurnState::Aborted)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one turn owns. Never persisted.
#[derive(Debug)]
pub struct TurnContext {
    pub turn_id: Uuid,
    pub conversation_id: String,
    pub principal: Principal,
    /// Resolved tokens by scope id
    pub tokens: HashMap<String, ExchangedToken>,
    pub profile: Option<UserProfile>,
    /// Tool calls in dispatch order
    pub invocations: Vec<ToolCallReport>,
    /// Degradations to report with the reply
    pub notices: Vec<Failure>,
}

impl TurnContext {
    pub fn new(turn_id: Uuid, conversation_id: impl Into<String>, principal: Principal) -> Self {
        Self {
            turn_id,
            conversation_id: conversation_id.into(),
            principal,
            tokens: HashMap::new(),
            profile: None,
            invocations: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn token_for(&self, scope_id: &str) -> Option<&ExchangedToken> {
        self.tokens.get(scope_id)
    }

    pub fn notice(&mut self, failure: Failure) {
        tracing::warn!(kind = %failure.kind, message = %failure.message, "Turn degraded");
        self.notices.push(failure);
    }
}
