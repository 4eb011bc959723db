//! Tool manifests and descriptors
//!
//! A tool server publishes a JSON manifest:
//!
//! ```json
//! {"tools": [{"name": "send_mail", "description": "...", "inputSchema": {...},
//!             "endpoint": "/rpc", "scope": "graph"}]}
//! ```
//!
//! Each entry is checked once, at refresh time, and turned into a
//! [`ToolDescriptor`] whose input is either [`ToolInput::NoArguments`] or a
//! compiled schema. Nothing loosely typed survives past this point.

use jsonschema::{Draft, Validator};
use oboe_common::ToolServerConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Accepted tool names
pub const TOOL_NAME_PATTERN: &str = "^[A-Za-z0-9_.-]{1,64}$";

/// Manifest document as served
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(default)]
    pub tools: Vec<ManifestEntry>,
}

/// One manifest entry as served
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub input_schema: Option<Value>,

    /// Absolute, or relative to the manifest URL
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Resource scope id
    #[serde(default)]
    pub scope: Option<String>,
}

/// Compiled JSON Schema
#[derive(Clone)]
pub struct CompiledSchema {
    raw: Value,
    validator: Arc<Validator>,
}

impl CompiledSchema {
    /// Compile `schema`; it must describe an object
    pub fn compile(schema: Value) -> Result<Self, String> {
        if !schema.is_object() {
            return Err("inputSchema must be a JSON object".to_string());
        }
        match schema.get("type") {
            None => {}
            Some(Value::String(t)) if t == "object" => {}
            Some(other) => return Err(format!("inputSchema type must be \"object\", got {}", other)),
        }

        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .map_err(|e| format!("inputSchema does not compile: {}", e))?;

        Ok(Self {
            raw: schema,
            validator: Arc::new(validator),
        })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Validation errors for `instance`, empty when valid
    pub fn errors(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect()
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema").field("raw", &self.raw).finish()
    }
}

impl PartialEq for CompiledSchema {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

/// Tool input shape
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    NoArguments,
    Schema(CompiledSchema),
}

impl ToolInput {
    /// Check `arguments` before any network call
    pub fn check(&self, arguments: &Value) -> Result<(), Vec<String>> {
        match self {
            ToolInput::NoArguments => match arguments {
                Value::Null => Ok(()),
                Value::Object(map) if map.is_empty() => Ok(()),
                _ => Err(vec!["tool takes no arguments".to_string()]),
            },
            ToolInput::Schema(schema) => {
                let empty = json!({});
                let instance = if arguments.is_null() { &empty } else { arguments };
                let errors = schema.errors(instance);
                if errors.is_empty() {
                    Ok(())
                } else {
                    Err(errors)
                }
            }
        }
    }

    /// Schema shown to the reasoner
    pub fn schema_json(&self) -> Value {
        match self {
            ToolInput::NoArguments => json!({"type": "object", "properties": {}}),
            ToolInput::Schema(schema) => schema.raw().clone(),
        }
    }
}

/// A validated, callable tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Name of the publishing tool server
    pub server: String,
    /// JSON-RPC endpoint
    pub endpoint: Url,
    pub input: ToolInput,
    /// Resource scope id whose token the call carries
    pub required_scope: String,
}

/// Turns manifest entries into descriptors
pub struct EntryRules {
    name_pattern: Regex,
    known_scopes: HashSet<String>,
}

impl EntryRules {
    pub fn new(known_scopes: impl IntoIterator<Item = String>) -> Result<Self, regex::Error> {
        Ok(Self {
            name_pattern: Regex::new(TOOL_NAME_PATTERN)?,
            known_scopes: known_scopes.into_iter().collect(),
        })
    }

    /// Validate one entry; `Err` carries the rejection reason
    pub fn descriptor(
        &self,
        entry: ManifestEntry,
        server: &ToolServerConfig,
    ) -> Result<ToolDescriptor, String> {
        if !self.name_pattern.is_match(&entry.name) {
            return Err(format!("invalid tool name '{}'", entry.name));
        }

        let endpoint = match &entry.endpoint {
            Some(raw) => server
                .manifest_url
                .join(raw)
                .map_err(|e| format!("invalid endpoint '{}': {}", raw, e))?,
            None => server
                .invoke_url
                .clone()
                .ok_or_else(|| "no endpoint and server has no invoke_url".to_string())?,
        };
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(format!("endpoint '{}' is not http(s)", endpoint));
        }

        let required_scope = entry.scope.unwrap_or_else(|| server.scope.clone());
        if !self.known_scopes.contains(&required_scope) {
            return Err(format!("unknown scope '{}'", required_scope));
        }

        let input = match entry.input_schema {
            None | Some(Value::Null) => ToolInput::NoArguments,
            Some(schema) => ToolInput::Schema(CompiledSchema::compile(schema)?),
        };

        Ok(ToolDescriptor {
            name: entry.name,
            description: entry.description.unwrap_or_default(),
            server: server.name.clone(),
            endpoint,
            input,
            required_scope,
        })
    }
}
