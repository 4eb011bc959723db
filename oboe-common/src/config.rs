//! Broker configuration
//!
//! Loaded once at service start from a TOML file. Durations use humantime
//! notation ("30s", "5m").

use crate::scope::ResourceScope;
use crate::CLIENT_SECRET_ENV;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Path that failed
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration is structurally valid but inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Identity provider settings
    pub identity: IdentityConfig,

    /// Downstream protected resources
    #[serde(default)]
    pub resources: Vec<ResourceScope>,

    /// Tool servers to discover
    #[serde(default)]
    pub tool_servers: Vec<ToolServerConfig>,

    /// Optional user-profile resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileConfig>,

    /// Token cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Consent storage settings
    #[serde(default)]
    pub consent: ConsentConfig,

    /// Tool registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Per-turn settings
    #[serde(default)]
    pub turn: TurnConfig,
}

/// Identity provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Directory tenant
    pub tenant_id: String,

    /// Client id of the agent application
    pub client_id: String,

    /// Client secret; prefer the `OBOE_CLIENT_SECRET` environment variable
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,

    /// OAuth2 token endpoint used for on-behalf-of exchange
    pub token_endpoint: Url,

    /// JWKS endpoint for inbound token signature validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<Url>,

    /// Static HS256 secret for development tenants (used instead of JWKS)
    #[serde(default, skip_serializing)]
    pub shared_secret: Option<String>,

    /// Accepted issuers of inbound tokens
    #[serde(default)]
    pub issuers: Vec<String>,

    /// Accepted audiences of inbound tokens
    #[serde(default)]
    pub audiences: Vec<String>,

    /// Clock skew leeway for `exp`/`nbf`
    #[serde(default = "IdentityConfig::default_leeway", with = "humantime_serde")]
    pub leeway: Duration,

    /// Backoff before the single retry of an unavailable provider
    #[serde(
        default = "IdentityConfig::default_retry_backoff",
        with = "humantime_serde"
    )]
    pub retry_backoff: Duration,

    /// HTTP timeout for token endpoint and JWKS requests
    #[serde(
        default = "IdentityConfig::default_request_timeout",
        with = "humantime_serde"
    )]
    pub request_timeout: Duration,
}

impl IdentityConfig {
    fn default_leeway() -> Duration {
        Duration::from_secs(60)
    }

    fn default_retry_backoff() -> Duration {
        Duration::from_millis(250)
    }

    fn default_request_timeout() -> Duration {
        Duration::from_secs(10)
    }

    /// Minimal configuration for a tenant, mostly useful in tests
    pub fn new(tenant_id: impl Into<String>, client_id: impl Into<String>, token_endpoint: Url) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: None,
            token_endpoint,
            jwks_uri: None,
            shared_secret: None,
            issuers: Vec::new(),
            audiences: Vec::new(),
            leeway: Self::default_leeway(),
            retry_backoff: Self::default_retry_backoff(),
            request_timeout: Self::default_request_timeout(),
        }
    }
}

/// A tool server to discover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Server name, used in logs and reports
    pub name: String,

    /// Discovery endpoint returning the tool manifest
    pub manifest_url: Url,

    /// Default invocation endpoint for tools that do not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoke_url: Option<Url>,

    /// Resource scope id the server's tools require by default
    pub scope: String,
}

/// User-profile resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Profile endpoint (e.g. https://graph.microsoft.com/v1.0/me)
    pub endpoint: Url,

    /// Resource scope id used to call it
    pub scope: String,
}

/// Token cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Tokens are treated as expired this long before their real expiry
    #[serde(with = "humantime_serde")]
    pub safety_margin: Duration,

    /// Maximum cached tokens
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(300),
            max_entries: 10_000,
        }
    }
}

/// Consent store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStoreKind {
    /// Process-local, lost on restart
    Memory,
    /// SQLite file, durable across restarts
    Sqlite,
}

/// Consent storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    /// Backend
    pub store: ConsentStoreKind,

    /// SQLite connection URL (required for the sqlite backend)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            store: ConsentStoreKind::Sqlite,
            database_url: Some("sqlite://oboe-consent.db".to_string()),
        }
    }
}

/// Tool registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Catalog age after which the next turn triggers a refresh
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// HTTP timeout for a single manifest fetch
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-turn settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Bound on a single tool invocation
    #[serde(with = "humantime_serde")]
    pub tool_timeout: Duration,

    /// Hard wall-clock budget for a whole turn
    #[serde(with = "humantime_serde")]
    pub budget: Duration,

    /// Pause before the automatic retry of a transient tool failure
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// Maximum Reasoning → ToolDispatch round trips
    pub max_reasoning_steps: usize,

    /// Resource scope ids every turn needs; empty derives them from
    /// the tool servers and the profile resource
    pub required_scopes: Vec<String>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(30),
            budget: Duration::from_secs(120),
            retry_backoff: Duration::from_millis(100),
            max_reasoning_steps: 8,
            required_scopes: Vec::new(),
        }
    }
}

impl BrokerConfig {
    /// Load, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = Self::from_toml_str(&content)?;
        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            if !secret.is_empty() {
                config.identity.client_secret = Some(secret);
            }
        }

        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            resources = config.resources.len(),
            tool_servers = config.tool_servers.len(),
            "Loaded broker configuration"
        );
        Ok(config)
    }

    /// Parse without validation or environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Look up a configured resource scope
    pub fn resource(&self, id: &str) -> Option<&ResourceScope> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Resource scopes every turn must resolve, in configuration order
    pub fn required_scopes(&self) -> Vec<ResourceScope> {
        let ids: Vec<&str> = if self.turn.required_scopes.is_empty() {
            self.tool_servers
                .iter()
                .map(|s| s.scope.as_str())
                .chain(self.profile.iter().map(|p| p.scope.as_str()))
                .collect()
        } else {
            self.turn.required_scopes.iter().map(String::as_str).collect()
        };

        self.resources
            .iter()
            .filter(|r| ids.contains(&r.id.as_str()))
            .cloned()
            .collect()
    }

    /// Check cross references and bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for resource in &self.resources {
            if resource.id.is_empty() {
                return Err(ConfigError::Invalid("resource with empty id".to_string()));
            }
            if !ids.insert(resource.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate resource id '{}'",
                    resource.id
                )));
            }
        }

        let mut server_names = HashSet::new();
        for server in &self.tool_servers {
            if !server_names.insert(server.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate tool server '{}'",
                    server.name
                )));
            }
            if !ids.contains(server.scope.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "tool server '{}' references unknown resource '{}'",
                    server.name, server.scope
                )));
            }
        }

        if let Some(profile) = &self.profile {
            if !ids.contains(profile.scope.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "profile references unknown resource '{}'",
                    profile.scope
                )));
            }
        }

        for id in &self.turn.required_scopes {
            if !ids.contains(id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "required scope '{}' is not a configured resource",
                    id
                )));
            }
        }

        if self.consent.store == ConsentStoreKind::Sqlite && self.consent.database_url.is_none() {
            return Err(ConfigError::Invalid(
                "consent.database_url is required for the sqlite store".to_string(),
            ));
        }

        if self.turn.tool_timeout.is_zero() || self.turn.budget.is_zero() {
            return Err(ConfigError::Invalid(
                "turn.tool_timeout and turn.budget must be non-zero".to_string(),
            ));
        }

        if self.turn.max_reasoning_steps == 0 {
            return Err(ConfigError::Invalid(
                "turn.max_reasoning_steps must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
