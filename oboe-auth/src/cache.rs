//! Token cache
//!
//! Caches exchanged tokens per (tenant, subject, resource scope) and makes
//! sure concurrent requests for the same key trigger a single exchange.
//! Entries expire `safety_margin` before the token itself does.
//!
//! An exchange runs on its own task. If every caller waiting on it goes
//! away the exchange still finishes and its token is kept for the next
//! request.

use crate::error::{AuthError, Result};
use crate::identity::IdentityProvider;
use crate::principal::Principal;
use crate::token::ExchangedToken;
use chrono::Utc;
use moka::future::Cache;
use moka::Expiry;
use oboe_common::{CacheConfig, ResourceScope};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant_id: String,
    pub subject_id: String,
    pub scope_id: String,
}

impl CacheKey {
    fn new(principal: &Principal, scope: &ResourceScope) -> Self {
        Self {
            tenant_id: principal.tenant_id.clone(),
            subject_id: principal.subject_id.clone(),
            scope_id: scope.id.clone(),
        }
    }
}

struct MarginExpiry {
    margin: Duration,
}

impl MarginExpiry {
    fn ttl(&self, token: &ExchangedToken) -> Option<Duration> {
        Some(token.usable_for(Utc::now(), self.margin).unwrap_or(Duration::ZERO))
    }
}

impl Expiry<CacheKey, ExchangedToken> for MarginExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &ExchangedToken,
        _created_at: Instant,
    ) -> Option<Duration> {
        self.ttl(value)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &ExchangedToken,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        self.ttl(value)
    }
}

/// Single-flight cache of exchanged tokens
#[derive(Clone)]
pub struct TokenCache {
    provider: Arc<dyn IdentityProvider>,
    entries: Cache<CacheKey, ExchangedToken>,
    safety_margin: Duration,
}

impl TokenCache {
    /// Create a cache in front of `provider`
    pub fn new(provider: Arc<dyn IdentityProvider>, config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(MarginExpiry {
                margin: config.safety_margin,
            })
            .build();

        Self {
            provider,
            entries,
            safety_margin: config.safety_margin,
        }
    }

    /// Identity provider behind the cache
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Get a usable token for `principal` and `scope`, exchanging if needed
    pub async fn get(&self, principal: &Principal, scope: &ResourceScope) -> Result<ExchangedToken> {
        let key = CacheKey::new(principal, scope);

        if let Some(token) = self.entries.get(&key).await {
            if token.is_usable_at(Utc::now(), self.safety_margin) {
                tracing::debug!(scope = %scope.id, subject = %principal.subject_id, "Token cache hit");
                return Ok(token);
            }
            self.entries.invalidate(&key).await;
        }

        let exchange = self.spawn_exchange(principal, scope, key.clone());
        let token = self
            .entries
            .try_get_with(key, exchange)
            .await
            .map_err(|e| (*e).clone())?;

        // A value handed over by moka may have been sitting on the edge of its window.
        if token.is_usable_at(Utc::now(), self.safety_margin) {
            Ok(token)
        } else {
            Err(AuthError::ProviderUnavailable(format!(
                "Token for '{}' expires within the safety margin",
                scope.id
            )))
        }
    }

    fn spawn_exchange(
        &self,
        principal: &Principal,
        scope: &ResourceScope,
        key: CacheKey,
    ) -> impl std::future::Future<Output = Result<ExchangedToken>> + Send + 'static {
        let provider = self.provider.clone();
        let entries = self.entries.clone();
        let margin = self.safety_margin;
        let subject_token = principal.raw_token().to_string();
        let scope = scope.clone();

        async move {
            let task = tokio::spawn(async move {
                tracing::debug!(scope = %scope.id, subject = %key.subject_id, "Token cache miss, exchanging");
                let result = match provider.exchange(&subject_token, &scope).await {
                    Ok(token) if token.is_usable_at(Utc::now(), margin) => {
                        entries.insert(key.clone(), token.clone()).await;
                        Ok(token)
                    }
                    Ok(_) => Err(AuthError::ProviderUnavailable(format!(
                        "Issued token for '{}' expires within the safety margin",
                        scope.id
                    ))),
                    Err(e) => Err(e),
                };

                if let Err(e) = &result {
                    tracing::warn!(
                        scope = %scope.id,
                        subject = %key.subject_id,
                        error = %e,
                        "Token exchange failed"
                    );
                }
                result
            });

            match task.await {
                Ok(result) => result,
                Err(e) => Err(AuthError::ProviderUnavailable(format!(
                    "Exchange task failed: {}",
                    e
                ))),
            }
        }
    }

    /// Drop the cached tokens of a subject for one scope
    pub async fn invalidate(&self, subject_id: &str, scope_id: &str) {
        self.invalidate_where(|key| key.subject_id == subject_id && key.scope_id == scope_id)
            .await;
    }

    /// Drop every cached token for a subject
    pub async fn invalidate_subject(&self, subject_id: &str) {
        let dropped = self.invalidate_where(|key| key.subject_id == subject_id).await;
        tracing::debug!(subject = %subject_id, dropped, "Subject tokens invalidated");
    }

    async fn invalidate_where(&self, matches: impl Fn(&CacheKey) -> bool) -> usize {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(key, _)| matches(key))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in &keys {
            self.entries.invalidate(key).await;
        }
        keys.len()
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Whether a usable token is cached
    pub async fn contains(&self, principal: &Principal, scope: &ResourceScope) -> bool {
        match self.entries.get(&CacheKey::new(principal, scope)).await {
            Some(token) => token.is_usable_at(Utc::now(), self.safety_margin),
            None => false,
        }
    }
}
