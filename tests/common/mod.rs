//! Common test utilities shared across integration and E2E tests

pub mod fixtures;
pub mod reasoner;

// Re-export commonly used items
pub use fixtures::*;
pub use reasoner::*;

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

/// Tenant every test token is issued for
pub const TENANT: &str = "contoso";

/// Client id of the agent application
pub const CLIENT_ID: &str = "agent-app";

/// HS256 secret shared between the token minter and the validator
pub const SHARED_SECRET: &str = "oboe-integration-secret";

pub const ISSUER: &str = "https://login.example/contoso/v2.0";
pub const AUDIENCE: &str = "api://agent-app";

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// A valid inbound token for `subject`, good for an hour
pub fn mint_token(subject: &str) -> String {
    mint(subject, ISSUER, Utc::now().timestamp() + 3600)
}

/// An inbound token that expired an hour ago
pub fn mint_expired_token(subject: &str) -> String {
    mint(subject, ISSUER, Utc::now().timestamp() - 3600)
}

/// A token signed with the right key but issued by someone else
pub fn mint_foreign_token(subject: &str) -> String {
    mint(subject, "https://login.example/fabrikam/v2.0", Utc::now().timestamp() + 3600)
}

fn mint(subject: &str, issuer: &str, exp: i64) -> String {
    let claims = json!({
        "sub": subject,
        "tid": TENANT,
        "iss": issuer,
        "aud": AUDIENCE,
        "exp": exp,
        "iat": Utc::now().timestamp(),
        "name": format!("{} (test)", subject),
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SHARED_SECRET.as_bytes()),
    )
    .expect("Failed to mint test token")
}
