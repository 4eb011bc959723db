//! Identity provider adapter
//!
//! [`IdentityProvider`] is the seam between the broker and the tenant's
//! identity service: validate an inbound token, and trade it for a token
//! scoped to one downstream resource.

use crate::error::{AuthError, Result};
use crate::obo::{classify_error, OboRequest, OboTokenResponse};
use crate::principal::Principal;
use crate::token::ExchangedToken;
use crate::validation::TokenValidator;
use async_trait::async_trait;
use chrono::Utc;
use oboe_common::{IdentityConfig, ResourceScope, CLIENT_SECRET_ENV};
use reqwest::Client;
use std::time::Duration;
use validator::Validate;

/// Identity provider operations
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate an inbound token
    async fn authenticate(&self, subject_token: &str) -> Result<Principal>;

    /// Exchange the user's token for one scoped to `scope`
    async fn exchange(&self, subject_token: &str, scope: &ResourceScope) -> Result<ExchangedToken>;
}

/// On-behalf-of exchange against an OAuth 2.0 token endpoint
pub struct OboIdentityProvider {
    config: IdentityConfig,
    client_secret: String,
    validator: TokenValidator,
    client: Client,
}

impl OboIdentityProvider {
    /// Create a provider from configuration
    pub fn new(config: IdentityConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let validator = TokenValidator::from_config(&config, client.clone())?;
        Self::with_validator(config, validator, client)
    }

    /// Create a provider with an explicit validator
    pub fn with_validator(
        config: IdentityConfig,
        validator: TokenValidator,
        client: Client,
    ) -> Result<Self> {
        let client_secret = config
            .client_secret
            .clone()
            .or_else(|| std::env::var(CLIENT_SECRET_ENV).ok())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AuthError::Config(format!(
                    "identity.client_secret or {} must be set",
                    CLIENT_SECRET_ENV
                ))
            })?;

        Ok(Self {
            config,
            client_secret,
            validator,
            client,
        })
    }

    async fn request_exchange(
        &self,
        subject_token: &str,
        scope: &ResourceScope,
    ) -> Result<ExchangedToken> {
        let request = OboRequest::new(
            &self.config.client_id,
            &self.client_secret,
            subject_token,
            scope.scope_param(),
        );
        request
            .validate()
            .map_err(|e| AuthError::InvalidToken(format!("Invalid exchange request: {}", e)))?;

        let response = self
            .client
            .post(self.config.token_endpoint.clone())
            .form(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_error(&scope.id, status, &body));
        }

        let parsed: OboTokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::ProviderUnavailable(format!("Malformed token response: {}", e))
        })?;

        let mut token = ExchangedToken::new(
            scope.id.clone(),
            parsed.access_token,
            Utc::now(),
            Duration::from_secs(parsed.expires_in),
        );
        if let Some(granted) = parsed.scope {
            token = token.with_granted_scope(granted);
        }
        Ok(token)
    }
}

#[async_trait]
impl IdentityProvider for OboIdentityProvider {
    async fn authenticate(&self, subject_token: &str) -> Result<Principal> {
        self.validator.validate(subject_token).await
    }

    async fn exchange(&self, subject_token: &str, scope: &ResourceScope) -> Result<ExchangedToken> {
        // Only a validated assertion is ever sent to the token endpoint.
        self.validator
            .validate(subject_token)
            .await
            .map_err(|e| match e {
                AuthError::InvalidToken(_) => e,
                other => AuthError::InvalidToken(format!("Assertion not validated: {}", other)),
            })?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request_exchange(subject_token, scope).await {
                Ok(token) => {
                    tracing::info!(
                        scope = %scope.id,
                        expires_at = %token.expires_at,
                        "Token exchanged"
                    );
                    return Ok(token);
                }
                Err(e) if e.is_retryable() && attempt == 1 => {
                    tracing::warn!(
                        scope = %scope.id,
                        error = %e,
                        backoff_ms = self.config.retry_backoff.as_millis() as u64,
                        "Token exchange failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
