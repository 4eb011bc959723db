//! # oboe-auth: delegated identity for the oboe broker
//!
//! Validates the user token carried by an inbound activity, trades it for
//! resource-scoped tokens through the on-behalf-of grant, caches those
//! tokens, and records the user's consent decisions.
//!
//! ## Flow
//!
//! ```text
//!   inbound activity (user JWT)
//!              ↓
//!   ┌──────────────────────────┐
//!   │ IdentityProvider         │  authenticate → Principal
//!   └──────────────────────────┘
//!              ↓
//!   ┌──────────────────────────┐
//!   │ ConsentGate              │  granted for scope?
//!   └──────────────────────────┘
//!              ↓
//!   ┌──────────────────────────┐
//!   │ TokenCache               │  hit, or one shared exchange
//!   └──────────────────────────┘
//!              ↓
//!   resource token (per scope)
//! ```

pub mod cache;
pub mod consent;
pub mod error;
pub mod identity;
pub mod jwks;
pub mod obo;
pub mod principal;
pub mod token;
pub mod validation;

pub use cache::{CacheKey, TokenCache};
pub use consent::{
    ConsentGate, ConsentRecord, ConsentStatus, ConsentStore, MemoryConsentStore,
    SqliteConsentStore,
};
pub use error::{AuthError, Result};
pub use identity::{IdentityProvider, OboIdentityProvider};
pub use jwks::JwksProvider;
pub use principal::{InboundClaims, Principal};
pub use token::ExchangedToken;
pub use validation::TokenValidator;
