//! Shared types for the oboe broker crates.
//!
//! Everything here is plain data: resource scopes, the structured failure
//! vocabulary used by every layer, and the TOML configuration model.

pub mod config;
pub mod failure;
pub mod scope;

pub use config::{
    BrokerConfig, CacheConfig, ConfigError, ConsentConfig, ConsentStoreKind, IdentityConfig,
    ProfileConfig, RegistryConfig, ToolServerConfig, TurnConfig,
};
pub use failure::{ErrorKind, Failure};
pub use scope::ResourceScope;

/// Environment variable that overrides `identity.client_secret`.
pub const CLIENT_SECRET_ENV: &str = "OBOE_CLIENT_SECRET";
