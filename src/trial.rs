//! Trial license eligibility.
//!
//! A server may start at most one non-sanctioned trial. Sanctioned trials
//! bypass the restriction. When history cannot be read the answer is an
//! error, never a default allow.

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::{LicenseError, LicenseResult};
use crate::license::License;

/// A trial license previously issued to this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialRecord {
    pub license_id: String,
    /// Issuance time, epoch milliseconds.
    pub issued_at: i64,
    pub is_sanctioned: bool,
}

impl TrialRecord {
    pub fn from_license(license: &License) -> Self {
        Self {
            license_id: license.id.clone(),
            issued_at: license.issued_at,
            is_sanctioned: license.is_sanctioned_trial,
        }
    }
}

/// Trial licenses previously issued to this server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrialHistory {
    pub entries: Vec<TrialRecord>,
}

impl TrialHistory {
    pub fn new(entries: Vec<TrialRecord>) -> Self {
        Self { entries }
    }

    /// Whether a non-sanctioned trial other than `exclude_id` was issued.
    pub fn has_unsanctioned_trial(&self, exclude_id: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| !entry.is_sanctioned && entry.license_id != exclude_id)
    }
}

/// Source of trial history for this server.
#[async_trait]
pub trait TrialHistorySource: Send + Sync {
    async fn trial_history(&self) -> LicenseResult<TrialHistory>;
}

/// Decide eligibility from already-loaded history.
///
/// The candidate's own id is not counted as a prior trial, so reloading an
/// installed trial after restart stays allowed.
pub fn can_start_trial(history: &TrialHistory, candidate: &License) -> bool {
    if candidate.is_sanctioned_trial {
        return true;
    }
    !history.has_unsanctioned_trial(&candidate.id)
}

/// Checks trial eligibility against a history source.
#[derive(Clone)]
pub struct TrialEligibilityChecker {
    source: Arc<dyn TrialHistorySource>,
}

impl TrialEligibilityChecker {
    pub fn new(source: Arc<dyn TrialHistorySource>) -> Self {
        Self { source }
    }

    /// Returns whether `candidate` may be started.
    ///
    /// Fails with `HistoryUnavailable` when history cannot be read.
    pub async fn can_start_trial(&self, candidate: &License) -> LicenseResult<bool> {
        let history = self.source.trial_history().await.map_err(|e| match e {
            LicenseError::HistoryUnavailable(_) => e,
            other => LicenseError::HistoryUnavailable(other.to_string()),
        })?;
        Ok(can_start_trial(&history, candidate))
    }
}

impl std::fmt::Debug for TrialEligibilityChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrialEligibilityChecker").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(id: &str, sanctioned: bool) -> License {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "is_trial": true,
            "is_sanctioned_trial": sanctioned,
        }))
        .unwrap()
    }

    fn record(id: &str, sanctioned: bool) -> TrialRecord {
        TrialRecord {
            license_id: id.to_string(),
            issued_at: 1,
            is_sanctioned: sanctioned,
        }
    }

    #[test]
    fn empty_history_allows_trial() {
        assert!(can_start_trial(&TrialHistory::default(), &trial("t1", false)));
    }

    #[test]
    fn prior_unsanctioned_trial_blocks_new_one() {
        let history = TrialHistory::new(vec![record("t0", false)]);
        assert!(!can_start_trial(&history, &trial("t1", false)));
    }

    #[test]
    fn sanctioned_candidate_bypasses_restriction() {
        let history = TrialHistory::new(vec![record("t0", false)]);
        assert!(can_start_trial(&history, &trial("t1", true)));
    }

    #[test]
    fn prior_sanctioned_trials_do_not_count() {
        let history = TrialHistory::new(vec![record("s0", true), record("s1", true)]);
        assert!(can_start_trial(&history, &trial("t1", false)));
    }

    #[test]
    fn candidate_is_not_its_own_predecessor() {
        let history = TrialHistory::new(vec![record("t1", false)]);
        assert!(can_start_trial(&history, &trial("t1", false)));
    }

    struct Broken;

    #[async_trait]
    impl TrialHistorySource for Broken {
        async fn trial_history(&self) -> LicenseResult<TrialHistory> {
            Err(LicenseError::StorageError("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn unreadable_history_is_an_error() {
        let checker = TrialEligibilityChecker::new(Arc::new(Broken));
        let result = checker.can_start_trial(&trial("t1", false)).await;
        assert!(matches!(result, Err(LicenseError::HistoryUnavailable(_))));
    }
}
