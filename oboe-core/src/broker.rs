//! Broker
//!
//! Owns the state shared across turns: the token cache, consent storage,
//! the tool registry and the outbound clients. Built once at service start
//! and handed to the orchestrator; `shutdown` releases the stores.

use crate::outcome::BrokerError;
use crate::profile::{HttpProfileService, ProfileService};
use oboe_auth::{
    ConsentGate, ConsentRecord, ConsentStore, IdentityProvider, MemoryConsentStore,
    OboIdentityProvider, SqliteConsentStore, TokenCache,
};
use oboe_common::{BrokerConfig, ConfigError, ConsentConfig, ConsentStoreKind, ResourceScope};
use oboe_tools::{
    HttpManifestSource, HttpToolInvoker, ManifestSource, RefreshReport, ToolInvoker, ToolRegistry,
};
use std::sync::Arc;

/// Open the configured consent backend
pub async fn open_consent_store(config: &ConsentConfig) -> Result<Arc<dyn ConsentStore>, BrokerError> {
    Ok(match config.store {
        ConsentStoreKind::Memory => Arc::new(MemoryConsentStore::new()),
        ConsentStoreKind::Sqlite => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                ConfigError::Invalid("consent.database_url is required for sqlite".to_string())
            })?;
            Arc::new(SqliteConsentStore::open(url).await?)
        }
    })
}

/// Collaborators a broker is assembled from
pub struct BrokerParts {
    pub identity: Arc<dyn IdentityProvider>,
    pub consent_store: Arc<dyn ConsentStore>,
    pub manifests: Arc<dyn ManifestSource>,
    pub invoker: Arc<dyn ToolInvoker>,
    pub profile: Option<Arc<dyn ProfileService>>,
}

/// Shared broker state
pub struct Broker {
    config: BrokerConfig,
    identity: Arc<dyn IdentityProvider>,
    tokens: TokenCache,
    consent: ConsentGate,
    registry: ToolRegistry,
    invoker: Arc<dyn ToolInvoker>,
    profile: Option<Arc<dyn ProfileService>>,
    initial_refresh: RefreshReport,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker").finish_non_exhaustive()
    }
}

impl Broker {
    /// Build the production collaborators from `config` and start
    pub async fn start(config: BrokerConfig) -> Result<Self, BrokerError> {
        config.validate()?;

        let identity: Arc<dyn IdentityProvider> =
            Arc::new(OboIdentityProvider::new(config.identity.clone())?);

        let consent_store = open_consent_store(&config.consent).await?;

        let manifests: Arc<dyn ManifestSource> =
            Arc::new(HttpManifestSource::new(config.registry.fetch_timeout)?);

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BrokerError::Setup(format!("Failed to build HTTP client: {}", e)))?;
        let invoker: Arc<dyn ToolInvoker> =
            Arc::new(HttpToolInvoker::new(client, config.turn.tool_timeout));

        let profile = match &config.profile {
            Some(p) => {
                let service = HttpProfileService::new(p.endpoint.clone(), config.identity.request_timeout)
                    .map_err(|f| BrokerError::Setup(f.message))?;
                Some(Arc::new(service) as Arc<dyn ProfileService>)
            }
            None => None,
        };

        Self::with_parts(
            config,
            BrokerParts {
                identity,
                consent_store,
                manifests,
                invoker,
                profile,
            },
        )
        .await
    }

    /// Assemble from explicit collaborators and run the first registry refresh
    pub async fn with_parts(config: BrokerConfig, parts: BrokerParts) -> Result<Self, BrokerError> {
        config.validate()?;

        let tokens = TokenCache::new(parts.identity.clone(), &config.cache);
        let consent = ConsentGate::new(parts.consent_store);
        let registry = ToolRegistry::new(
            config.tool_servers.clone(),
            config.resources.iter().map(|r| r.id.clone()),
            parts.manifests,
            &config.registry,
        )?;

        let initial_refresh = registry.refresh().await?;
        tracing::info!(
            tools = initial_refresh.tool_count,
            unreachable = initial_refresh.unreachable.len(),
            "Broker started"
        );

        Ok(Self {
            config,
            identity: parts.identity,
            tokens,
            consent,
            registry,
            invoker: parts.invoker,
            profile: parts.profile,
            initial_refresh,
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    pub fn consent(&self) -> &ConsentGate {
        &self.consent
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn invoker(&self) -> &Arc<dyn ToolInvoker> {
        &self.invoker
    }

    pub fn profile(&self) -> Option<&Arc<dyn ProfileService>> {
        self.profile.as_ref()
    }

    /// Report of the refresh run at start
    pub fn initial_refresh(&self) -> &RefreshReport {
        &self.initial_refresh
    }

    fn scope(&self, scope_id: &str) -> Result<&ResourceScope, BrokerError> {
        self.config
            .resource(scope_id)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown resource scope '{}'", scope_id)).into())
    }

    /// Record consent for a subject
    pub async fn grant_consent(&self, subject_id: &str, scope_id: &str) -> Result<ConsentRecord, BrokerError> {
        let scope = self.scope(scope_id)?;
        Ok(self.consent.grant(subject_id, scope).await?)
    }

    /// Withdraw consent and drop tokens already issued for it
    pub async fn revoke_consent(&self, subject_id: &str, scope_id: &str) -> Result<ConsentRecord, BrokerError> {
        let scope = self.scope(scope_id)?;
        let record = self.consent.revoke(subject_id, scope).await?;
        self.tokens.invalidate(subject_id, scope_id).await;
        Ok(record)
    }

    /// Forget every token held for a subject
    pub async fn sign_out(&self, subject_id: &str) {
        self.tokens.invalidate_subject(subject_id).await;
        tracing::info!(subject = %subject_id, "Signed out");
    }

    /// Release stores
    pub async fn shutdown(&self) -> Result<(), BrokerError> {
        self.tokens.clear();
        self.consent.close().await?;
        tracing::info!("Broker stopped");
        Ok(())
    }
}
