//! JWKS signing key provider
//!
//! Fetches the identity provider's published signing keys and caches them
//! by `kid`. An unknown `kid` triggers one refetch (keys rotate).

use crate::error::{AuthError, Result};
use jsonwebtoken::DecodingKey;
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

/// Upper bound on a JWKS document
const MAX_JWKS_BYTES: u64 = 512 * 1024;

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    n: Option<String>,
    e: Option<String>,
    x: Option<String>,
    y: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// Cached JWKS key lookup
#[derive(Clone)]
pub struct JwksProvider {
    cache: Cache<String, Arc<DecodingKey>>, // kid -> key
    client: Client,
    jwks_uri: Url,
    refresh_lock: Arc<Mutex<()>>,
}

impl JwksProvider {
    /// Create a provider for `jwks_uri`
    pub fn new(jwks_uri: Url, client: Client) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(100)
                .time_to_live(Duration::from_secs(24 * 3600))
                .build(),
            client,
            jwks_uri,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Resolve the decoding key for `kid`
    pub async fn get_key(&self, kid: &str) -> Result<Arc<DecodingKey>> {
        if let Some(key) = self.cache.get(kid).await {
            return Ok(key);
        }

        // One refetch at a time; a concurrent caller may already have loaded the key.
        let _guard = self.refresh_lock.lock().await;
        if let Some(key) = self.cache.get(kid).await {
            return Ok(key);
        }

        self.refresh().await?;

        self.cache
            .get(kid)
            .await
            .ok_or_else(|| AuthError::InvalidToken(format!("Unknown signing key id: {}", kid)))
    }

    async fn refresh(&self) -> Result<()> {
        tracing::info!(uri = %self.jwks_uri, "Refreshing JWKS");
        let response = self.client.get(self.jwks_uri.clone()).send().await?;

        if !response.status().is_success() {
            return Err(AuthError::ProviderUnavailable(format!(
                "JWKS request failed: {}",
                response.status()
            )));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_JWKS_BYTES {
                return Err(AuthError::ProviderUnavailable(format!(
                    "JWKS response too large: {} bytes",
                    len
                )));
            }
        }

        let jwks: JwksResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(format!("Failed to parse JWKS: {}", e)))?;

        let mut loaded = 0usize;
        for jwk in jwks.keys {
            let Some(kid) = jwk.kid.clone() else {
                continue;
            };
            match decoding_key(&jwk) {
                Some(key) => {
                    self.cache.insert(kid, Arc::new(key)).await;
                    loaded += 1;
                }
                None => tracing::debug!(kid = %kid, kty = %jwk.kty, "Skipping unsupported JWK"),
            }
        }

        tracing::debug!(keys = loaded, "JWKS loaded");
        Ok(())
    }
}

fn decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    match jwk.kty.as_str() {
        "RSA" => {
            let (n, e) = (jwk.n.as_deref()?, jwk.e.as_deref()?);
            DecodingKey::from_rsa_components(n, e).ok()
        }
        "EC" => {
            let (x, y) = (jwk.x.as_deref()?, jwk.y.as_deref()?);
            DecodingKey::from_ec_components(x, y).ok()
        }
        _ => None,
    }
}
