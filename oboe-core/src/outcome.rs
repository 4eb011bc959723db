//! Turn outcomes and errors

use crate::reasoning::ToolCallReport;
use crate::turn::TurnState;
use oboe_auth::AuthError;
use oboe_common::{ConfigError, ErrorKind, Failure, ResourceScope};
use oboe_tools::ToolError;
use serde::{Deserialize, Serialize};

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed {
        reply: String,
        invocations: Vec<ToolCallReport>,
    },
    /// The user must approve access first; no resource was called
    ConsentRequired {
        scopes: Vec<String>,
        message: String,
    },
    /// A reply was produced, but without some resources or steps
    Degraded {
        reply: String,
        failures: Vec<Failure>,
        invocations: Vec<ToolCallReport>,
    },
}

impl TurnOutcome {
    /// Text for the channel
    pub fn reply(&self) -> &str {
        match self {
            TurnOutcome::Completed { reply, .. } | TurnOutcome::Degraded { reply, .. } => reply,
            TurnOutcome::ConsentRequired { message, .. } => message,
        }
    }

    pub fn invocations(&self) -> &[ToolCallReport] {
        match self {
            TurnOutcome::Completed { invocations, .. }
            | TurnOutcome::Degraded { invocations, .. } => invocations,
            TurnOutcome::ConsentRequired { .. } => &[],
        }
    }

    pub(crate) fn consent(scopes: &[&ResourceScope]) -> Self {
        let labels: Vec<&str> = scopes.iter().map(|s| s.label()).collect();
        TurnOutcome::ConsentRequired {
            scopes: scopes.iter().map(|s| s.id.clone()).collect(),
            message: format!(
                "I need your permission to access {} on your behalf. Please grant access and try again.",
                labels.join(", ")
            ),
        }
    }
}

/// A turn that ended in the Aborted state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Turn aborted during {state}: {failure}")]
pub struct TurnError {
    /// State the turn was in when it aborted
    pub state: TurnState,
    pub failure: Failure,
}

impl TurnError {
    pub fn new(state: TurnState, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            state,
            failure: Failure::new(kind, message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.failure.kind
    }

    /// Only provider outages are worth retrying the whole turn for
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.failure.kind,
            ErrorKind::ProviderUnavailable | ErrorKind::Timeout
        )
    }
}

/// Errors building or shutting down a broker
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Tools(#[from] ToolError),

    #[error("Setup failed: {0}")]
    Setup(String),
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::Config(_) => ErrorKind::Configuration,
            BrokerError::Auth(e) => e.kind(),
            BrokerError::Tools(e) => e.kind(),
            BrokerError::Setup(_) => ErrorKind::Configuration,
        }
    }
}
