//! Consent gate
//!
//! Records whether a user has approved delegated access to a resource
//! scope. The gate is consulted before any exchange for that scope.
//! Records are partitioned by subject: operations for one user never
//! block on another user's.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oboe_common::ResourceScope;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod memory;
mod sqlite;

pub use memory::MemoryConsentStore;
pub use sqlite::SqliteConsentStore;

/// Consent state for one (subject, scope) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Granted,
    NotGranted,
}

/// Stored consent decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConsentRecord {
    pub subject_id: String,
    pub scope: String,
    pub granted: bool,
    pub updated_at: DateTime<Utc>,
}

impl ConsentRecord {
    /// New record stamped now
    pub fn new(subject_id: impl Into<String>, scope: impl Into<String>, granted: bool) -> Self {
        Self {
            subject_id: subject_id.into(),
            scope: scope.into(),
            granted,
            updated_at: Utc::now(),
        }
    }

    pub fn status(&self) -> ConsentStatus {
        if self.granted {
            ConsentStatus::Granted
        } else {
            ConsentStatus::NotGranted
        }
    }
}

/// Consent persistence
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Load the record for a subject and scope
    async fn load(&self, subject_id: &str, scope_id: &str) -> Result<Option<ConsentRecord>>;

    /// Atomically record a decision for a subject and scope.
    ///
    /// A stored record that already carries `granted` is returned unchanged
    /// with `false`; otherwise a fresh record is written and returned with
    /// `true`.
    async fn set(
        &self,
        subject_id: &str,
        scope_id: &str,
        granted: bool,
    ) -> Result<(ConsentRecord, bool)>;

    /// All records of a subject, ordered by scope
    async fn list(&self, subject_id: &str) -> Result<Vec<ConsentRecord>>;

    /// Flush and release resources
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Grant, revoke and check delegated-access consent
#[derive(Clone)]
pub struct ConsentGate {
    store: Arc<dyn ConsentStore>,
}

impl ConsentGate {
    pub fn new(store: Arc<dyn ConsentStore>) -> Self {
        Self { store }
    }

    /// Current consent state; absence means not granted
    pub async fn check(&self, subject_id: &str, scope: &ResourceScope) -> Result<ConsentStatus> {
        let status = self
            .store
            .load(subject_id, &scope.id)
            .await?
            .map(|r| r.status())
            .unwrap_or(ConsentStatus::NotGranted);
        Ok(status)
    }

    /// Record consent. Granting twice leaves the first record untouched.
    pub async fn grant(&self, subject_id: &str, scope: &ResourceScope) -> Result<ConsentRecord> {
        let (record, changed) = self.store.set(subject_id, &scope.id, true).await?;
        if changed {
            tracing::info!(subject = %subject_id, scope = %scope.id, "Consent granted");
        }
        Ok(record)
    }

    /// Withdraw consent
    pub async fn revoke(&self, subject_id: &str, scope: &ResourceScope) -> Result<ConsentRecord> {
        let (record, changed) = self.store.set(subject_id, &scope.id, false).await?;
        if changed {
            tracing::info!(subject = %subject_id, scope = %scope.id, "Consent revoked");
        }
        Ok(record)
    }

    /// Every recorded decision for a subject
    pub async fn records(&self, subject_id: &str) -> Result<Vec<ConsentRecord>> {
        self.store.list(subject_id).await
    }

    /// Close the underlying store
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}
