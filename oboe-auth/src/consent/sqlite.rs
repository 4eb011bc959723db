//! SQLite-backed consent records

use super::{ConsentRecord, ConsentStore};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::str::FromStr;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS consent_records (
    subject_id TEXT NOT NULL,
    scope TEXT NOT NULL,
    granted BOOLEAN NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (subject_id, scope)
)";

/// Durable consent store
#[derive(Debug, Clone)]
pub struct SqliteConsentStore {
    pool: SqlitePool,
}

impl SqliteConsentStore {
    /// Open (creating if needed) the database at `database_url`
    pub async fn open(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        tracing::debug!(database = %database_url, "Consent store opened");

        Ok(Self { pool })
    }
}

#[async_trait]
impl ConsentStore for SqliteConsentStore {
    async fn load(&self, subject_id: &str, scope_id: &str) -> Result<Option<ConsentRecord>> {
        let record = sqlx::query_as::<_, ConsentRecord>(
            "SELECT subject_id, scope, granted, updated_at FROM consent_records WHERE subject_id = ? AND scope = ?",
        )
        .bind(subject_id)
        .bind(scope_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn set(
        &self,
        subject_id: &str,
        scope_id: &str,
        granted: bool,
    ) -> Result<(ConsentRecord, bool)> {
        let record = ConsentRecord::new(subject_id, scope_id, granted);
        let mut tx = self.pool.begin().await?;

        // RETURNING yields nothing when the stored decision already matches.
        let written = sqlx::query_as::<_, ConsentRecord>(
            "INSERT INTO consent_records (subject_id, scope, granted, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(subject_id, scope) DO UPDATE SET granted = excluded.granted, updated_at = excluded.updated_at
             WHERE consent_records.granted <> excluded.granted
             RETURNING subject_id, scope, granted, updated_at",
        )
        .bind(&record.subject_id)
        .bind(&record.scope)
        .bind(record.granted)
        .bind(record.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match written {
            Some(written) => (written, true),
            None => {
                let existing = sqlx::query_as::<_, ConsentRecord>(
                    "SELECT subject_id, scope, granted, updated_at FROM consent_records WHERE subject_id = ? AND scope = ?",
                )
                .bind(subject_id)
                .bind(scope_id)
                .fetch_one(&mut *tx)
                .await?;
                (existing, false)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn list(&self, subject_id: &str) -> Result<Vec<ConsentRecord>> {
        let records = sqlx::query_as::<_, ConsentRecord>(
            "SELECT subject_id, scope, granted, updated_at FROM consent_records WHERE subject_id = ? ORDER BY scope",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
