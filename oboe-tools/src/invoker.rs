//! Tool invocation
//!
//! One `tools/call` JSON-RPC request per invocation, carrying the caller's
//! delegated token. Arguments are checked against the descriptor before
//! anything goes on the wire, and every call is bounded by a deadline.

use crate::error::InvocationError;
use crate::manifest::ToolDescriptor;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// JSON-RPC code for invalid params
const INVALID_PARAMS: i64 = -32602;

/// Result of a completed call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// MCP content items
    #[serde(default)]
    pub content: Vec<Value>,

    /// Tool-level error flag; the call itself succeeded
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    /// Concatenated text items
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<ToolResult>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Executes tool calls
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Call `tool` with `arguments` using `token` as bearer
    async fn invoke(
        &self,
        tool: &ToolDescriptor,
        arguments: &Value,
        token: &str,
    ) -> Result<ToolResult, InvocationError>;
}

/// Run `call`, failing with [`InvocationError::Timeout`] once `timeout` elapses
pub async fn with_deadline<T, F>(timeout: Duration, call: F) -> Result<T, InvocationError>
where
    F: Future<Output = Result<T, InvocationError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(InvocationError::Timeout(timeout)),
    }
}

/// JSON-RPC over HTTP
pub struct HttpToolInvoker {
    client: Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl HttpToolInvoker {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call(
        &self,
        tool: &ToolDescriptor,
        arguments: &Value,
        token: &str,
    ) -> Result<ToolResult, InvocationError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let arguments = if arguments.is_null() { json!({}) } else { arguments.clone() };
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": tool.name, "arguments": arguments},
        });

        let response = self
            .client
            .post(tool.endpoint.clone())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InvocationError::Timeout(self.timeout)
                } else {
                    InvocationError::upstream(502, format!("transport failure: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status(status, detail));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| InvocationError::upstream(502, format!("malformed response: {}", e)))?;

        match (parsed.result, parsed.error) {
            (_, Some(err)) if err.code == INVALID_PARAMS => {
                Err(InvocationError::SchemaMismatch(vec![err.message]))
            }
            (_, Some(err)) => Err(InvocationError::upstream(
                502,
                format!("rpc error {}: {}", err.code, err.message),
            )),
            (Some(result), None) => Ok(result),
            (None, None) => Err(InvocationError::upstream(502, "response has neither result nor error")),
        }
    }
}

fn map_status(status: StatusCode, detail: String) -> InvocationError {
    let message = if detail.is_empty() {
        status.to_string()
    } else {
        detail.chars().take(512).collect()
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => InvocationError::AuthFailure(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            InvocationError::SchemaMismatch(vec![message])
        }
        other => InvocationError::upstream(other.as_u16(), message),
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(
        &self,
        tool: &ToolDescriptor,
        arguments: &Value,
        token: &str,
    ) -> Result<ToolResult, InvocationError> {
        tool.input
            .check(arguments)
            .map_err(InvocationError::SchemaMismatch)?;

        let started = std::time::Instant::now();
        let result = with_deadline(self.timeout, self.call(tool, arguments, token)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(r) => tracing::debug!(tool = %tool.name, elapsed_ms, is_error = r.is_error, "Tool call completed"),
            Err(e) => tracing::warn!(tool = %tool.name, elapsed_ms, error = %e, "Tool call failed"),
        }
        result
    }
}
