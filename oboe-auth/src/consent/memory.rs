use super::{ConsentRecord, ConsentStore};
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

type Partition = Arc<tokio::sync::RwLock<BTreeMap<String, ConsentRecord>>>;

/// In-process consent store, one lock per subject
#[derive(Default)]
pub struct MemoryConsentStore {
    partitions: RwLock<HashMap<String, Partition>>,
}

impl MemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing partition; reads never create one
    fn existing(&self, subject_id: &str) -> Result<Option<Partition>> {
        let partitions = self.partitions.read().map_err(poisoned)?;
        Ok(partitions.get(subject_id).cloned())
    }

    fn partition(&self, subject_id: &str) -> Result<Partition> {
        if let Some(partition) = self.existing(subject_id)? {
            return Ok(partition);
        }

        let mut partitions = self.partitions.write().map_err(poisoned)?;
        Ok(partitions.entry(subject_id.to_string()).or_default().clone())
    }

    #[cfg(test)]
    fn subject_count(&self) -> usize {
        self.partitions.read().map(|p| p.len()).unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> AuthError {
    AuthError::Storage("consent partition map poisoned".to_string())
}

#[async_trait]
impl ConsentStore for MemoryConsentStore {
    async fn load(&self, subject_id: &str, scope_id: &str) -> Result<Option<ConsentRecord>> {
        let Some(partition) = self.existing(subject_id)? else {
            return Ok(None);
        };
        let records = partition.read().await;
        Ok(records.get(scope_id).cloned())
    }

    async fn set(
        &self,
        subject_id: &str,
        scope_id: &str,
        granted: bool,
    ) -> Result<(ConsentRecord, bool)> {
        let partition = self.partition(subject_id)?;
        let mut records = partition.write().await;
        if let Some(existing) = records.get(scope_id) {
            if existing.granted == granted {
                return Ok((existing.clone(), false));
            }
        }

        let record = ConsentRecord::new(subject_id, scope_id, granted);
        records.insert(scope_id.to_string(), record.clone());
        Ok((record, true))
    }

    async fn list(&self, subject_id: &str) -> Result<Vec<ConsentRecord>> {
        let Some(partition) = self.existing(subject_id)? else {
            return Ok(Vec::new());
        };
        let records = partition.read().await;
        Ok(records.values().cloned().collect())
    }
}
