//! Error types for identity, token and consent operations

use oboe_common::{ErrorKind, Failure};

/// Result type for oboe-auth operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Identity and consent errors
///
/// `Clone` so a single failed exchange can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Inbound token is malformed, expired, or fails signature/issuer/audience checks
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The user must approve delegated access before the exchange can succeed
    #[error("Consent required for '{scope}': {message}")]
    ConsentRequired {
        /// Resource scope id
        scope: String,
        /// Provider detail
        message: String,
    },

    /// Identity provider unreachable, throttled, or answering with server errors
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Consent storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Misconfiguration detected at runtime
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::ProviderUnavailable(_))
    }

    /// Structured failure class
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidToken(_) => ErrorKind::AuthenticationFailure,
            AuthError::ConsentRequired { .. } => ErrorKind::ConsentRequired,
            AuthError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            AuthError::Storage(_) => ErrorKind::Storage,
            AuthError::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Presentation form
    pub fn to_failure(&self) -> Failure {
        Failure::new(self.kind(), self.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::ProviderUnavailable(err.to_string())
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken(err.to_string())
    }
}
