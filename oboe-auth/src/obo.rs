//! On-behalf-of wire types
//!
//! OAuth 2.0 JWT bearer grant used to trade a user's inbound token for a
//! resource-scoped token (RFC 7523 with `requested_token_use=on_behalf_of`),
//! plus classification of the provider's error responses.

use crate::error::AuthError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Grant type for on-behalf-of exchanges
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Provider code for a missing user or admin grant
const CONSENT_ERROR_CODE: u32 = 65001;

/// Form body of an on-behalf-of token request
#[derive(Clone, Serialize, Validate)]
pub struct OboRequest {
    /// Always [`JWT_BEARER_GRANT`]
    pub grant_type: &'static str,

    /// Calling application
    #[validate(length(min = 1))]
    pub client_id: String,

    pub client_secret: String,

    /// The user's inbound token
    #[validate(length(min = 1))]
    pub assertion: String,

    /// Space separated, fully qualified scopes
    #[validate(length(min = 1))]
    pub scope: String,

    pub requested_token_use: &'static str,
}

impl OboRequest {
    /// Build a request for `scope`
    pub fn new(client_id: &str, client_secret: &str, assertion: &str, scope: String) -> Self {
        Self {
            grant_type: JWT_BEARER_GRANT,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            assertion: assertion.to_string(),
            scope,
            requested_token_use: "on_behalf_of",
        }
    }
}

/// Successful token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OboTokenResponse {
    /// Issued access token
    pub access_token: String,

    /// Usually "Bearer"
    #[serde(default)]
    pub token_type: Option<String>,

    /// Lifetime in seconds
    pub expires_in: u64,

    /// Granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

/// Error response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,

    #[serde(default)]
    pub error_description: Option<String>,

    #[serde(default)]
    pub error_codes: Vec<u32>,

    #[serde(default)]
    pub suberror: Option<String>,
}

impl TokenErrorResponse {
    /// Whether the provider is asking for user interaction or consent
    pub fn needs_consent(&self) -> bool {
        matches!(self.error.as_str(), "interaction_required" | "consent_required")
            || self.suberror.as_deref() == Some("consent_required")
            || self.error_codes.contains(&CONSENT_ERROR_CODE)
    }

    fn detail(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{}: {}", self.error, description),
            None => self.error.clone(),
        }
    }
}

/// Map a non-success token endpoint response to an [`AuthError`]
pub fn classify_error(scope_id: &str, status: StatusCode, body: &str) -> AuthError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return AuthError::ProviderUnavailable(format!("Token endpoint returned {}", status));
    }

    let parsed: Option<TokenErrorResponse> = serde_json::from_str(body).ok();
    match parsed {
        Some(err)
            if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED)
                && err.needs_consent() =>
        {
            AuthError::ConsentRequired {
                scope: scope_id.to_string(),
                message: err.detail(),
            }
        }
        Some(err) if status.is_client_error() => AuthError::InvalidToken(err.detail()),
        None if status.is_client_error() => {
            AuthError::InvalidToken(format!("Token endpoint rejected the request: {}", status))
        }
        _ => AuthError::ProviderUnavailable(format!("Unexpected token endpoint status {}", status)),
    }
}
