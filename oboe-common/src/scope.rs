//! Resource scopes
//!
//! A resource scope names a downstream protected resource and the delegated
//! permissions the broker asks for when exchanging a user's token for it.

use serde::{Deserialize, Serialize};

/// OpenID Connect scopes the identity provider expects unqualified
pub const OIDC_SCOPES: [&str; 4] = ["openid", "profile", "email", "offline_access"];

/// A protected resource plus the permission scopes required to call it.
///
/// Configured at startup and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceScope {
    /// Short handle used in configuration and consent records (e.g. "graph")
    pub id: String,

    /// Resource / audience identifier (e.g. "https://graph.microsoft.com")
    pub resource: String,

    /// Permission scopes (e.g. "User.Read")
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Human readable name for consent prompts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ResourceScope {
    /// Create a new resource scope
    pub fn new(
        id: impl Into<String>,
        resource: impl Into<String>,
        scopes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            resource: resource.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
            display_name: None,
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name shown to users in consent prompts
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    /// Scopes as sent to the identity provider.
    ///
    /// Bare permission names are qualified with the resource
    /// (`User.Read` → `https://graph.microsoft.com/User.Read`); names that
    /// already carry a scheme are passed through, as are the OpenID
    /// Connect scopes in [`OIDC_SCOPES`]. With no permissions
    /// configured the resource's `.default` scope is requested.
    pub fn qualified_scopes(&self) -> Vec<String> {
        let resource = self.resource.trim_end_matches('/');
        if self.scopes.is_empty() {
            return vec![format!("{resource}/.default")];
        }

        self.scopes
            .iter()
            .map(|scope| {
                if scope.contains("://") || OIDC_SCOPES.contains(&scope.as_str()) {
                    scope.clone()
                } else {
                    format!("{resource}/{scope}")
                }
            })
            .collect()
    }

    /// Space separated scope parameter for the token endpoint
    pub fn scope_param(&self) -> String {
        self.qualified_scopes().join(" ")
    }
}
