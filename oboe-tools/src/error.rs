//! Registry and invocation errors

use oboe_common::{ErrorKind, Failure};
use std::time::Duration;

/// Tool registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// Two servers publish a tool with the same name
    #[error("Tool '{name}' is published by both '{first}' and '{second}'")]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },

    /// Manifest could not be fetched
    #[error("Failed to fetch manifest from '{server}': {message}")]
    Fetch { server: String, message: String },

    /// Manifest document is not valid
    #[error("Invalid manifest from '{server}': {message}")]
    Manifest { server: String, message: String },

    /// Misconfiguration detected at runtime
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::NameCollision { .. } | ToolError::Config(_) => ErrorKind::Configuration,
            ToolError::Fetch { .. } | ToolError::Manifest { .. } => ErrorKind::ToolRegistryPartial,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Fetch { .. })
    }

    pub fn to_failure(&self) -> Failure {
        Failure::new(self.kind(), self.to_string())
    }
}

/// Outcome classes of a failed tool call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
    /// Tool server rejected the bearer token
    #[error("Authorization rejected: {0}")]
    AuthFailure(String),

    /// Arguments do not match the tool's input schema
    #[error("Arguments rejected: {}", .0.join("; "))]
    SchemaMismatch(Vec<String>),

    /// Tool server failed
    #[error("Upstream error {code}: {message}")]
    UpstreamError { code: u16, message: String },

    /// No answer within the deadline
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl InvocationError {
    /// Timeouts and server-side failures may succeed on a second attempt
    pub fn is_transient(&self) -> bool {
        match self {
            InvocationError::Timeout(_) => true,
            InvocationError::UpstreamError { code, .. } => *code >= 500,
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            InvocationError::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::ToolInvocationFailure,
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure::new(self.kind(), self.to_string())
    }

    pub(crate) fn upstream(code: u16, message: impl Into<String>) -> Self {
        InvocationError::UpstreamError {
            code,
            message: message.into(),
        }
    }
}
