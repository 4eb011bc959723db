//! # oboe-tools: tool discovery and invocation
//!
//! - [`ToolRegistry`] fetches manifests from configured tool servers and
//!   keeps an immutable [`ToolCatalog`] snapshot.
//! - [`ToolInvoker`] executes one JSON-RPC `tools/call` against a
//!   descriptor with a delegated bearer token.

pub mod error;
pub mod invoker;
pub mod manifest;
pub mod registry;

pub use error::{InvocationError, ToolError};
pub use invoker::{with_deadline, HttpToolInvoker, ToolInvoker, ToolResult};
pub use manifest::{CompiledSchema, ManifestDocument, ManifestEntry, ToolDescriptor, ToolInput};
pub use registry::{
    HttpManifestSource, ManifestSource, RefreshReport, RejectedEntry, ToolCatalog, ToolRegistry,
};
