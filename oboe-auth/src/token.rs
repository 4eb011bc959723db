//! Exchanged tokens

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// A delegated access token for one resource scope
#[derive(Clone, PartialEq, Eq)]
pub struct ExchangedToken {
    /// Resource scope id the token was issued for
    pub scope: String,

    value: String,

    /// Absolute expiry
    pub expires_at: DateTime<Utc>,

    /// When the exchange completed
    pub issued_at: DateTime<Utc>,

    /// Scope string granted by the provider
    pub granted_scope: Option<String>,
}

impl ExchangedToken {
    /// Create a token that expires `expires_in` after `issued_at`
    pub fn new(
        scope: impl Into<String>,
        value: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_in: Duration,
    ) -> Self {
        let expires_in =
            chrono::Duration::from_std(expires_in).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            scope: scope.into(),
            value: value.into(),
            expires_at: issued_at + expires_in,
            issued_at,
            granted_scope: None,
        }
    }

    /// Attach the granted scope string
    pub fn with_granted_scope(mut self, granted: impl Into<String>) -> Self {
        self.granted_scope = Some(granted.into());
        self
    }

    /// Bearer value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Remaining lifetime at `now` once `margin` is subtracted, if positive
    pub fn usable_for(&self, now: DateTime<Utc>, margin: Duration) -> Option<Duration> {
        let margin = chrono::Duration::from_std(margin).ok()?;
        let remaining = self.expires_at - margin - now;
        if remaining <= chrono::Duration::zero() {
            return None;
        }
        remaining.to_std().ok()
    }

    /// Whether the token may still be handed out at `now`
    pub fn is_usable_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.usable_for(now, margin).is_some()
    }
}

impl fmt::Debug for ExchangedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangedToken")
            .field("scope", &self.scope)
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("issued_at", &self.issued_at)
            .field("granted_scope", &self.granted_scope)
            .finish()
    }
}
