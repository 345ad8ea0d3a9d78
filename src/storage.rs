//! Persistence of signed license records.
//!
//! The lifecycle manager only needs three things from storage: the active
//! record, a way to save a new one, and a way to clear the active marker.
//! Read failures are treated as "no record" by the manager.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::{LicenseError, LicenseResult};
use crate::license::{now_millis, License, LicenseRecord};
use crate::trial::{TrialHistory, TrialHistorySource, TrialRecord};

/// Storage for raw signed license blobs.
#[async_trait]
pub trait LicenseStorage: Send + Sync {
    /// The record currently marked active, if any.
    async fn get_license_record(&self) -> LicenseResult<Option<LicenseRecord>>;

    /// Save a validated license and mark it active.
    async fn save_license_record(&self, bytes: &[u8], license: &License)
        -> LicenseResult<LicenseRecord>;

    /// Clear the active marker. Saved records are kept for history.
    async fn clear_active_license(&self) -> LicenseResult<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, LicenseRecord>,
    active: Option<String>,
}

/// In-memory storage, useful for tests and single-process deployments.
///
/// Every saved record is kept, so it also serves as the server's trial history.
#[derive(Debug, Default)]
pub struct InMemoryLicenseStorage {
    state: Mutex<MemoryState>,
}

impl InMemoryLicenseStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LicenseResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| LicenseError::StorageError("failed to acquire storage lock".into()))
    }

    /// Number of records ever saved.
    pub fn record_count(&self) -> usize {
        self.lock().map(|state| state.records.len()).unwrap_or(0)
    }

    /// Id of the active record.
    pub fn active_id(&self) -> Option<String> {
        self.lock().ok().and_then(|state| state.active.clone())
    }
}

#[async_trait]
impl LicenseStorage for InMemoryLicenseStorage {
    async fn get_license_record(&self) -> LicenseResult<Option<LicenseRecord>> {
        let state = self.lock()?;
        Ok(state
            .active
            .as_ref()
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn save_license_record(
        &self,
        bytes: &[u8],
        license: &License,
    ) -> LicenseResult<LicenseRecord> {
        let record = LicenseRecord {
            id: license.id.clone(),
            bytes: bytes.to_vec(),
            license: license.clone(),
            created_at: now_millis(),
        };

        let mut state = self.lock()?;
        state.records.insert(record.id.clone(), record.clone());
        state.active = Some(record.id.clone());
        Ok(record)
    }

    async fn clear_active_license(&self) -> LicenseResult<()> {
        self.lock()?.active = None;
        Ok(())
    }
}

#[async_trait]
impl TrialHistorySource for InMemoryLicenseStorage {
    async fn trial_history(&self) -> LicenseResult<TrialHistory> {
        let state = self
            .lock()
            .map_err(|e| LicenseError::HistoryUnavailable(e.to_string()))?;

        let mut entries: Vec<TrialRecord> = state
            .records
            .values()
            .filter(|record| record.license.is_trial)
            .map(|record| TrialRecord::from_license(&record.license))
            .collect();
        entries.sort_by_key(|entry| entry.issued_at);

        Ok(TrialHistory::new(entries))
    }
}
