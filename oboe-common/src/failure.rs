//! Structured failure vocabulary
//!
//! Every error surfaced by the broker maps onto an [`ErrorKind`] so
//! presentation layers can pick a message without parsing free text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure classes shared by all broker layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Inbound token is missing, malformed, expired or untrusted
    AuthenticationFailure,
    /// The user has not approved delegated access to a resource
    ConsentRequired,
    /// The identity provider could not be reached or answered with a server error
    ProviderUnavailable,
    /// Some tool servers were unreachable during a refresh
    ToolRegistryPartial,
    /// A tool call failed
    ToolInvocationFailure,
    /// A deadline elapsed
    Timeout,
    /// The turn was cancelled by the channel
    Cancelled,
    /// Invalid configuration (including tool name collisions)
    Configuration,
    /// The reasoning loop failed or exceeded its step bound
    ReasoningFailure,
    /// Durable storage failed
    Storage,
}

impl ErrorKind {
    /// Stable identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthenticationFailure => "authentication_failure",
            ErrorKind::ConsentRequired => "consent_required",
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::ToolRegistryPartial => "tool_registry_partial",
            ErrorKind::ToolInvocationFailure => "tool_invocation_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Configuration => "configuration",
            ErrorKind::ReasoningFailure => "reasoning_failure",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure as handed to presentation layers and the reasoning loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Failure class
    pub kind: ErrorKind,

    /// Human readable detail
    pub message: String,
}

impl Failure {
    /// Create a new failure
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}
