//! Coordination record persistence seam.

use crate::selector::SelectionResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use keystone_core::{Program, RecordId, RunId, TenantId, TimeWindow};
use keystone_plan::PlanCandidate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Store failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend refused or could not be reached
    #[error("Store unavailable: {reason}")]
    Unavailable {
        /// Why
        reason: String,
    },

    /// Record ID already taken
    #[error("Record already exists: {record_id}")]
    Duplicate {
        /// Offending ID
        record_id: RecordId,
    },
}

/// Audit record of one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationRecord {
    /// Record ID
    pub record_id: RecordId,
    /// Tenant
    pub tenant: TenantId,
    /// Attempt run ID
    pub run_id: RunId,
    /// Program as submitted
    pub program: Program,
    /// Selection outcome
    pub selection: SelectionResult,
    /// Window the chosen candidate occupies
    pub window: TimeWindow,
    /// Chosen candidate
    pub candidate: PlanCandidate,
    /// Archived records are kept for audit only
    pub archived: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Record persistence seam
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Persist a record
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be durably stored
    async fn save(&self, record: &CoordinationRecord) -> Result<(), StoreError>;

    /// Fetch a record by ID
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be read
    async fn get(&self, record_id: &RecordId) -> Result<Option<CoordinationRecord>, StoreError>;

    /// All records for a tenant, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be read
    async fn list(&self, tenant: &TenantId) -> Result<Vec<CoordinationRecord>, StoreError>;
}

/// Process-local store
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<IndexMap<RecordId, CoordinationRecord>>>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Check if nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn save(&self, record: &CoordinationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.record_id) {
            return Err(StoreError::Duplicate {
                record_id: record.record_id.clone(),
            });
        }
        records.insert(record.record_id.clone(), record.clone());
        tracing::debug!(record_id = %record.record_id, run_id = %record.run_id, "stored record");
        Ok(())
    }

    async fn get(&self, record_id: &RecordId) -> Result<Option<CoordinationRecord>, StoreError> {
        Ok(self.records.read().await.get(record_id).cloned())
    }

    async fn list(&self, tenant: &TenantId) -> Result<Vec<CoordinationRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| &r.tenant == tenant)
            .cloned()
            .collect())
    }
}
