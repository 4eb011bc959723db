//! Tool registry
//!
//! Fetches manifests from every configured tool server and builds one
//! catalog. Unreachable servers are left out of the catalog; a tool name
//! published by two servers fails the refresh and keeps the previous
//! catalog.

use crate::error::ToolError;
use crate::manifest::{EntryRules, ManifestDocument, ToolDescriptor};
use async_trait::async_trait;
use futures::future::join_all;
use oboe_common::{RegistryConfig, ToolServerConfig};
use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Where manifests come from
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Raw manifest body for `server`
    async fn fetch(&self, server: &ToolServerConfig) -> Result<String, ToolError>;
}

/// Fetches manifests over HTTP
pub struct HttpManifestSource {
    client: Client,
}

impl HttpManifestSource {
    pub fn new(fetch_timeout: Duration) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| ToolError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, server: &ToolServerConfig) -> Result<String, ToolError> {
        let fetch_err = |message: String| ToolError::Fetch {
            server: server.name.clone(),
            message,
        };

        let response = self
            .client
            .get(server.manifest_url.clone())
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", response.status())));
        }

        response.text().await.map_err(|e| fetch_err(e.to_string()))
    }
}

/// Immutable catalog snapshot
#[derive(Debug, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, ToolDescriptor>,
    /// Manifest fingerprint per loaded server
    fingerprints: BTreeMap<String, String>,
}

impl ToolCatalog {
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Tools in name order
    pub fn tools(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools whose scope is in `scopes`, in name order
    pub fn for_scopes(&self, scopes: &HashSet<String>) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .filter(|t| scopes.contains(&t.required_scope))
            .cloned()
            .collect()
    }

    /// Combined fingerprint of the manifests behind this catalog
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (server, digest) in &self.fingerprints {
            hasher.update(server.as_bytes());
            hasher.update(digest.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    fn server_tools(&self, server: &str) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .filter(|t| t.server == server)
            .cloned()
            .collect()
    }
}

/// A manifest entry that did not make it into the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEntry {
    pub server: String,
    pub tool: String,
    pub reason: String,
}

/// What a refresh did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Servers whose manifests were loaded
    pub loaded: Vec<String>,
    /// (server, reason) for servers left out
    pub unreachable: Vec<(String, String)>,
    pub rejected: Vec<RejectedEntry>,
    pub tool_count: usize,
    /// Whether the catalog snapshot was replaced
    pub changed: bool,
}

impl RefreshReport {
    /// Some servers were excluded
    pub fn is_partial(&self) -> bool {
        !self.unreachable.is_empty()
    }
}

/// Registry of tools across all configured servers
pub struct ToolRegistry {
    servers: Vec<ToolServerConfig>,
    rules: EntryRules,
    source: Arc<dyn ManifestSource>,
    catalog: RwLock<Arc<ToolCatalog>>,
    refreshed_at: RwLock<Option<Instant>>,
    refresh_interval: Duration,
    refresh_lock: Mutex<()>,
}

impl ToolRegistry {
    /// Registry over `servers`; `scopes` are the configured resource scope ids
    pub fn new(
        servers: Vec<ToolServerConfig>,
        scopes: impl IntoIterator<Item = String>,
        source: Arc<dyn ManifestSource>,
        config: &RegistryConfig,
    ) -> Result<Self, ToolError> {
        let rules = EntryRules::new(scopes).map_err(|e| ToolError::Config(e.to_string()))?;
        Ok(Self {
            servers,
            rules,
            source,
            catalog: RwLock::new(Arc::new(ToolCatalog::default())),
            refreshed_at: RwLock::new(None),
            refresh_interval: config.refresh_interval,
            refresh_lock: Mutex::new(()),
        })
    }

    /// Current snapshot
    pub fn catalog(&self) -> Arc<ToolCatalog> {
        match self.catalog.read() {
            Ok(catalog) => catalog.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Refresh when the catalog is older than the refresh interval
    pub async fn ensure_fresh(&self) -> Result<Option<RefreshReport>, ToolError> {
        if !self.is_stale() {
            return Ok(None);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another turn may have refreshed while this one waited.
        if !self.is_stale() {
            return Ok(None);
        }
        self.refresh_locked().await.map(Some)
    }

    /// Fetch every manifest and rebuild the catalog
    pub async fn refresh(&self) -> Result<RefreshReport, ToolError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    fn is_stale(&self) -> bool {
        let refreshed_at = match self.refreshed_at.read() {
            Ok(at) => *at,
            Err(poisoned) => *poisoned.into_inner(),
        };
        refreshed_at.map_or(true, |at| at.elapsed() >= self.refresh_interval)
    }

    /// Failed refreshes count as attempts, so a bad manifest is retried
    /// once per interval rather than on every turn.
    async fn refresh_locked(&self) -> Result<RefreshReport, ToolError> {
        let result = self.rebuild().await;
        match self.refreshed_at.write() {
            Ok(mut at) => *at = Some(Instant::now()),
            Err(poisoned) => *poisoned.into_inner() = Some(Instant::now()),
        }
        result
    }

    async fn rebuild(&self) -> Result<RefreshReport, ToolError> {
        let previous = self.catalog();
        let fetches = self.servers.iter().map(|server| self.source.fetch(server));
        let bodies = join_all(fetches).await;

        let mut report = RefreshReport::default();
        let mut tools: BTreeMap<String, ToolDescriptor> = BTreeMap::new();
        let mut fingerprints = BTreeMap::new();

        for (server, body) in self.servers.iter().zip(bodies) {
            let body = match body {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "Tool server unreachable, excluded from catalog");
                    report.unreachable.push((server.name.clone(), e.to_string()));
                    continue;
                }
            };

            let digest = hex::encode(Sha256::digest(body.as_bytes()));
            let server_tools = if previous.fingerprints.get(&server.name) == Some(&digest) {
                tracing::debug!(server = %server.name, "Manifest unchanged");
                previous.server_tools(&server.name)
            } else {
                match self.parse_manifest(server, &body, &mut report) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::warn!(server = %server.name, error = %e, "Manifest unreadable, excluded from catalog");
                        report.unreachable.push((server.name.clone(), e.to_string()));
                        continue;
                    }
                }
            };

            for tool in server_tools {
                if let Some(existing) = tools.get(&tool.name) {
                    return Err(ToolError::NameCollision {
                        name: tool.name.clone(),
                        first: existing.server.clone(),
                        second: server.name.clone(),
                    });
                }
                tools.insert(tool.name.clone(), tool);
            }

            fingerprints.insert(server.name.clone(), digest);
            report.loaded.push(server.name.clone());
        }

        report.tool_count = tools.len();
        report.changed = fingerprints != previous.fingerprints;

        if report.changed {
            let catalog = Arc::new(ToolCatalog {
                tools,
                fingerprints,
            });
            match self.catalog.write() {
                Ok(mut slot) => *slot = catalog,
                Err(poisoned) => *poisoned.into_inner() = catalog,
            }
        }

        tracing::info!(
            loaded = report.loaded.len(),
            unreachable = report.unreachable.len(),
            rejected = report.rejected.len(),
            tools = report.tool_count,
            changed = report.changed,
            "Tool registry refreshed"
        );
        Ok(report)
    }

    fn parse_manifest(
        &self,
        server: &ToolServerConfig,
        body: &str,
        report: &mut RefreshReport,
    ) -> Result<Vec<ToolDescriptor>, ToolError> {
        let document: ManifestDocument =
            serde_json::from_str(body).map_err(|e| ToolError::Manifest {
                server: server.name.clone(),
                message: e.to_string(),
            })?;

        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        for entry in document.tools {
            let name = entry.name.clone();
            if !seen.insert(name.clone()) {
                tracing::warn!(server = %server.name, tool = %name, "Duplicate tool in manifest, keeping first");
                report.rejected.push(RejectedEntry {
                    server: server.name.clone(),
                    tool: name,
                    reason: "duplicate name in manifest".to_string(),
                });
                continue;
            }

            match self.rules.descriptor(entry, server) {
                Ok(tool) => accepted.push(tool),
                Err(reason) => {
                    tracing::warn!(server = %server.name, tool = %name, reason = %reason, "Manifest entry rejected");
                    report.rejected.push(RejectedEntry {
                        server: server.name.clone(),
                        tool: name,
                        reason,
                    });
                }
            }
        }
        Ok(accepted)
    }

    /// Configured servers
    pub fn servers(&self) -> &[ToolServerConfig] {
        &self.servers
    }

    /// Tools per server in the current catalog
    pub fn counts_by_server(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for tool in self.catalog().tools() {
            *counts.entry(tool.server.clone()).or_insert(0) += 1;
        }
        counts
    }
}
