//! Principal
//!
//! The signed-in user behind an inbound activity, built from a validated
//! inbound token. Created per request and never mutated.

use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Claims read from a validated inbound token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundClaims {
    /// Subject
    pub sub: String,

    /// Object id of the user (stable across applications)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,

    /// Tenant id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,

    /// Issuer
    pub iss: String,

    /// Audience (string or array)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,

    /// Expiration time
    pub exp: i64,

    /// Issued at time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Sign-in name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// Delegated scopes granted to the calling client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scp: Option<String>,

    /// Remaining claims
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The user an activity acts on behalf of
#[derive(Clone, PartialEq, Validate)]
pub struct Principal {
    /// Stable user identifier (`oid`, falling back to `sub`)
    #[validate(length(min = 1, max = 255))]
    pub subject_id: String,

    /// Tenant identifier (`tid`, empty when absent)
    #[validate(length(max = 255))]
    pub tenant_id: String,

    /// Raw inbound token, used as the OBO assertion
    raw_token: String,

    /// Validated claims
    pub claims: InboundClaims,
}

impl Principal {
    /// Create a principal from validated claims
    pub fn from_claims(raw_token: impl Into<String>, claims: InboundClaims) -> Result<Self> {
        let principal = Self {
            subject_id: claims.oid.clone().unwrap_or_else(|| claims.sub.clone()),
            tenant_id: claims.tid.clone().unwrap_or_default(),
            raw_token: raw_token.into(),
            claims,
        };

        principal
            .validate()
            .map_err(|e| AuthError::InvalidToken(format!("Invalid principal: {}", e)))?;

        Ok(principal)
    }

    /// Raw inbound token
    pub fn raw_token(&self) -> &str {
        &self.raw_token
    }

    /// Display name, falling back to the sign-in name
    pub fn display_name(&self) -> Option<&str> {
        self.claims
            .name
            .as_deref()
            .or(self.claims.preferred_username.as_deref())
    }

    /// Canonical identifier for audit logs
    pub fn canonical_id(&self) -> String {
        if self.tenant_id.is_empty() {
            self.subject_id.clone()
        } else {
            format!("{}@{}", self.subject_id, self.tenant_id)
        }
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("subject_id", &self.subject_id)
            .field("tenant_id", &self.tenant_id)
            .field("raw_token", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_claims(sub: &str) -> InboundClaims {
    InboundClaims {
        sub: sub.to_string(),
        oid: None,
        tid: Some("contoso".to_string()),
        iss: "https://login.example/contoso/v2.0".to_string(),
        aud: Some(serde_json::json!("api://agent-app")),
        exp: chrono::Utc::now().timestamp() + 3600,
        iat: None,
        name: Some("Alice".to_string()),
        preferred_username: None,
        scp: None,
        extra: Default::default(),
    }
}
