//! CLI command implementations
//!
//! Each command loads the broker configuration and talks to the library
//! crates directly; none of them start a long-running service.

use crate::ConsentAction;
use anyhow::{anyhow, Context, Result};
use oboe_auth::{ConsentGate, IdentityProvider, OboIdentityProvider};
use oboe_common::{BrokerConfig, ResourceScope};
use oboe_core::open_consent_store;
use oboe_tools::{HttpManifestSource, RefreshReport, ToolCatalog, ToolRegistry};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn load(path: &Path) -> Result<BrokerConfig> {
    BrokerConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn resource<'a>(config: &'a BrokerConfig, scope_id: &str) -> Result<&'a ResourceScope> {
    config
        .resource(scope_id)
        .ok_or_else(|| anyhow!("Unknown resource scope '{}'", scope_id))
}

/// Validate a configuration file and print what it describes
pub fn check_config(path: &Path) -> Result<()> {
    let config = load(path)?;

    println!("✓ {} is valid", path.display());
    println!();
    println!("Tenant:       {}", config.identity.tenant_id);
    println!("Client:       {}", config.identity.client_id);
    println!("Token URL:    {}", config.identity.token_endpoint);
    println!(
        "Validation:   {}",
        match (&config.identity.jwks_uri, &config.identity.shared_secret) {
            (Some(uri), _) => format!("JWKS {}", uri),
            (None, Some(_)) => "shared secret (HS256)".to_string(),
            (None, None) => "none configured".to_string(),
        }
    );
    println!(
        "Secret:       {}",
        if config.identity.client_secret.is_some() {
            "set"
        } else {
            "missing"
        }
    );

    println!();
    println!("Resources:");
    for r in &config.resources {
        println!("  {:<12} {} [{}]", r.id, r.resource, r.scopes.join(" "));
    }

    println!();
    println!("Tool servers:");
    for s in &config.tool_servers {
        println!("  {:<12} {} (scope: {})", s.name, s.manifest_url, s.scope);
    }

    if let Some(profile) = &config.profile {
        println!();
        println!("Profile:      {} (scope: {})", profile.endpoint, profile.scope);
    }

    let required: Vec<String> = config.required_scopes().into_iter().map(|r| r.id).collect();
    println!();
    println!("Required:     {}", required.join(", "));
    println!("Consent:      {:?}", config.consent.store);
    println!(
        "Turn:         budget {:?}, tool timeout {:?}, {} reasoning steps",
        config.turn.budget, config.turn.tool_timeout, config.turn.max_reasoning_steps
    );
    Ok(())
}

/// Refresh every tool server once and print the result
pub async fn list_tools(path: &Path, json: bool) -> Result<()> {
    let config = load(path)?;
    let source = Arc::new(HttpManifestSource::new(config.registry.fetch_timeout)?);
    let registry = ToolRegistry::new(
        config.tool_servers.clone(),
        config.resources.iter().map(|r| r.id.clone()),
        source,
        &config.registry,
    )?;

    let report = registry.refresh().await?;
    let catalog = registry.catalog();
    info!(tools = catalog.len(), "Registry refreshed");

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog_json(&catalog, &report))?);
        return Ok(());
    }

    let mut tools: Vec<_> = catalog.tools().collect();
    tools.sort_by(|a, b| (&a.server, &a.name).cmp(&(&b.server, &b.name)));
    for tool in tools {
        println!(
            "{:<10} {:<28} [{}] {}",
            tool.server, tool.name, tool.required_scope, tool.description
        );
    }

    println!();
    let mut counts: Vec<_> = registry.counts_by_server().into_iter().collect();
    counts.sort();
    for (server, count) in counts {
        println!("  {}: {} tools", server, count);
    }
    for (server, reason) in &report.unreachable {
        println!("  ✗ {} unreachable: {}", server, reason);
    }
    for rejected in &report.rejected {
        println!(
            "  ✗ {}/{} rejected: {}",
            rejected.server, rejected.tool, rejected.reason
        );
    }
    Ok(())
}

fn catalog_json(catalog: &ToolCatalog, report: &RefreshReport) -> serde_json::Value {
    let tools: Vec<serde_json::Value> = catalog
        .tools()
        .map(|t| {
            serde_json::json!({
                "name": t.name,
                "description": t.description,
                "server": t.server,
                "endpoint": t.endpoint.as_str(),
                "scope": t.required_scope,
                "inputSchema": t.input.schema_json(),
            })
        })
        .collect();

    serde_json::json!({
        "fingerprint": catalog.fingerprint(),
        "tools": tools,
        "report": report,
    })
}

/// Run a consent subcommand against the configured store
pub async fn consent(path: &Path, action: ConsentAction) -> Result<()> {
    let config = load(path)?;
    let gate = ConsentGate::new(open_consent_store(&config.consent).await?);

    let result = run_consent(&config, &gate, action).await;
    gate.close().await?;
    result
}

async fn run_consent(config: &BrokerConfig, gate: &ConsentGate, action: ConsentAction) -> Result<()> {
    match action {
        ConsentAction::Grant { subject, scope } => {
            let record = gate.grant(&subject, resource(config, &scope)?).await?;
            println!("✓ {} granted {} at {}", record.subject_id, record.scope, record.updated_at);
        }
        ConsentAction::Revoke { subject, scope } => {
            let record = gate.revoke(&subject, resource(config, &scope)?).await?;
            println!("✓ {} revoked {} at {}", record.subject_id, record.scope, record.updated_at);
        }
        ConsentAction::Check { subject, scope } => {
            let status = gate.check(&subject, resource(config, &scope)?).await?;
            println!("{} / {}: {:?}", subject, scope, status);
        }
        ConsentAction::List { subject } => {
            let records = gate.records(&subject).await?;
            if records.is_empty() {
                println!("No consent recorded for {}", subject);
            }
            for record in records {
                println!(
                    "{:<12} {:<8} {}",
                    record.scope,
                    if record.granted { "granted" } else { "revoked" },
                    record.updated_at
                );
            }
        }
    }
    Ok(())
}

/// Authenticate `token` and exchange it for `scope_id`
///
/// Prints the expiry and granted scopes only; the exchanged token is never shown.
pub async fn exchange(path: &Path, token: &str, scope_id: &str) -> Result<()> {
    let config = load(path)?;
    let scope = resource(&config, scope_id)?;
    let provider = OboIdentityProvider::new(config.identity.clone())?;

    let principal = provider
        .authenticate(token)
        .await
        .context("Inbound token rejected")?;
    println!(
        "Subject:  {} ({})",
        principal.display_name().unwrap_or("unknown"),
        principal.canonical_id()
    );

    let exchanged = provider.exchange(token, scope).await?;
    let remaining = exchanged.expires_at - chrono::Utc::now();
    println!("Resource: {} ({})", scope.label(), scope.resource);
    println!(
        "Expires:  {} (in {}s)",
        exchanged.expires_at,
        remaining.num_seconds()
    );
    println!(
        "Granted:  {}",
        exchanged.granted_scope.as_deref().unwrap_or("(not reported)")
    );
    Ok(())
}
