//! Inbound token validation
//!
//! Verifies signature, expiry, issuer and audience of the token carried by
//! an inbound activity. Production deployments verify against the
//! provider's JWKS (RS256/ES256); a static HS256 secret is accepted for
//! local development and tests.

use crate::error::{AuthError, Result};
use crate::jwks::JwksProvider;
use crate::principal::{InboundClaims, Principal};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use oboe_common::IdentityConfig;
use std::sync::Arc;
use std::time::Duration;

enum KeySource {
    Jwks(JwksProvider),
    Shared(Arc<DecodingKey>),
}

/// Validates inbound bearer tokens
pub struct TokenValidator {
    keys: KeySource,
    issuers: Vec<String>,
    audiences: Vec<String>,
    leeway: Duration,
}

impl TokenValidator {
    /// Validator backed by a JWKS endpoint
    pub fn with_jwks(jwks: JwksProvider) -> Self {
        Self {
            keys: KeySource::Jwks(jwks),
            issuers: Vec::new(),
            audiences: Vec::new(),
            leeway: Duration::from_secs(60),
        }
    }

    /// Validator using a shared HS256 secret
    pub fn with_shared_secret(secret: &[u8]) -> Self {
        Self {
            keys: KeySource::Shared(Arc::new(DecodingKey::from_secret(secret))),
            issuers: Vec::new(),
            audiences: Vec::new(),
            leeway: Duration::from_secs(60),
        }
    }

    /// Build from identity configuration
    pub fn from_config(config: &IdentityConfig, client: reqwest::Client) -> Result<Self> {
        let validator = if let Some(uri) = &config.jwks_uri {
            Self::with_jwks(JwksProvider::new(uri.clone(), client))
        } else if let Some(secret) = &config.shared_secret {
            tracing::warn!("Validating inbound tokens with a shared HS256 secret");
            Self::with_shared_secret(secret.as_bytes())
        } else {
            return Err(AuthError::Config(
                "identity.jwks_uri or identity.shared_secret is required".to_string(),
            ));
        };

        Ok(validator
            .with_issuers(config.issuers.clone())
            .with_audiences(config.audiences.clone())
            .with_leeway(config.leeway))
    }

    /// Accepted issuers (any when empty)
    pub fn with_issuers(mut self, issuers: Vec<String>) -> Self {
        self.issuers = issuers;
        self
    }

    /// Accepted audiences (any when empty)
    pub fn with_audiences(mut self, audiences: Vec<String>) -> Self {
        self.audiences = audiences;
        self
    }

    /// Clock skew tolerance
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Validate `token` and build its principal
    pub async fn validate(&self, token: &str) -> Result<Principal> {
        let header = decode_header(token)
            .map_err(|e| AuthError::InvalidToken(format!("Malformed token header: {}", e)))?;

        let key = match &self.keys {
            KeySource::Jwks(jwks) => {
                if !matches!(header.alg, Algorithm::RS256 | Algorithm::ES256) {
                    return Err(AuthError::InvalidToken(format!(
                        "Unsupported algorithm: {:?}",
                        header.alg
                    )));
                }
                let kid = header
                    .kid
                    .as_deref()
                    .ok_or_else(|| AuthError::InvalidToken("Token has no key id".to_string()))?;
                jwks.get_key(kid).await?
            }
            KeySource::Shared(key) => {
                if header.alg != Algorithm::HS256 {
                    return Err(AuthError::InvalidToken(format!(
                        "Unsupported algorithm: {:?}",
                        header.alg
                    )));
                }
                key.clone()
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway.as_secs();
        if !self.issuers.is_empty() {
            validation.set_issuer(&self.issuers);
        }
        if self.audiences.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.audiences);
        }

        let data = decode::<InboundClaims>(token, &key, &validation).map_err(|e| {
            let reason = match e.kind() {
                JwtErrorKind::ExpiredSignature => "token expired".to_string(),
                JwtErrorKind::InvalidIssuer => "issuer not accepted".to_string(),
                JwtErrorKind::InvalidAudience => "audience not accepted".to_string(),
                JwtErrorKind::InvalidSignature => "signature mismatch".to_string(),
                _ => e.to_string(),
            };
            AuthError::InvalidToken(reason)
        })?;

        let principal = Principal::from_claims(token, data.claims)?;
        tracing::debug!(principal = %principal.canonical_id(), "Inbound token validated");
        Ok(principal)
    }
}
