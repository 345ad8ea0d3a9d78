//! License lifecycle orchestration.
//!
//! [`LicenseManager`] owns the current-license slot and wires the validator,
//! trial eligibility checker and renewal codec to the collaborators supplied
//! by the host server (storage, user directory, site settings, trial issuer).
//!
//! # Startup
//!
//! [`LicenseManager::load_at_startup`] tries, in order:
//! 1. the environment override,
//! 2. the persisted active record,
//! 3. the configured license file,
//! 4. the unrestricted fallback license, when enabled.
//!
//! Sources are only consulted until one yields a result. A source that is
//! present but invalid is logged and the prior state is kept; it never
//! aborts startup.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{FallbackConfig, KeystoneConfig};
use crate::directory::{DirectoryError, UserDirectory};
use crate::errors::{LicenseError, LicenseResult};
use crate::keys::KeyProvider;
use crate::license::{now_millis, Customer, Features, License, SkuShortName};
use crate::logging::{log_license_event, LicenseEvent};
use crate::overrides::OverrideSource;
use crate::renewal::{RenewalClaims, RenewalTokenCodec};
use crate::site::SiteConfigProvider;
use crate::storage::LicenseStorage;
use crate::store::{LicenseListener, LicenseStore, ListenerId};
use crate::trial::{TrialEligibilityChecker, TrialHistorySource};
use crate::upstream::{TrialLicenseRequest, TrialRequestSink};
use crate::validator::LicenseValidator;

/// Where an installed license came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseSource {
    Environment,
    Persisted,
    File,
    Fallback,
}

impl std::fmt::Display for LicenseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseSource::Environment => "environment",
            LicenseSource::Persisted => "persisted",
            LicenseSource::File => "file",
            LicenseSource::Fallback => "fallback",
        };
        write!(f, "{}", s)
    }
}

/// External collaborators the manager depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub keys: Arc<dyn KeyProvider>,
    pub storage: Arc<dyn LicenseStorage>,
    pub trial_history: Arc<dyn TrialHistorySource>,
    pub directory: Arc<dyn UserDirectory>,
    pub trial_sink: Arc<dyn TrialRequestSink>,
    pub site: Arc<dyn SiteConfigProvider>,
    pub overrides: Arc<dyn OverrideSource>,
}

#[cfg(feature = "trial-http")]
impl Collaborators {
    /// Build the config-driven collaborators around host-supplied storage and directory.
    ///
    /// Keys, the environment override, site settings and the HTTP trial client
    /// all come from `config`.
    pub fn from_config<S>(
        config: &KeystoneConfig,
        storage: Arc<S>,
        directory: Arc<dyn UserDirectory>,
    ) -> LicenseResult<Self>
    where
        S: LicenseStorage + TrialHistorySource + 'static,
    {
        use crate::keys::StaticKeys;
        use crate::overrides::EnvOverride;
        use crate::upstream::HttpTrialClient;

        Ok(Self {
            keys: Arc::new(StaticKeys::from_config(&config.keys)?),
            storage: storage.clone(),
            trial_history: storage,
            directory,
            trial_sink: Arc::new(HttpTrialClient::from_config(&config.trial)?),
            site: Arc::new(config.site.clone()),
            overrides: Arc::new(EnvOverride::new(config.license.env_var.clone())),
        })
    }
}

/// Policy knobs for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct LicensePolicy {
    /// Unrestricted license used when no source provides one
    pub fallback: FallbackConfig,
    /// License file consulted when storage has no active record
    pub license_file: Option<PathBuf>,
    /// Lifetime of renewal tokens when the caller passes none
    pub renewal_ttl: Duration,
    /// Renewal page the token is appended to
    pub renewal_url: String,
}

impl Default for LicensePolicy {
    fn default() -> Self {
        Self::from_config(&KeystoneConfig::default())
    }
}

impl LicensePolicy {
    pub fn from_config(config: &KeystoneConfig) -> Self {
        let file = config.license.file_location.trim();
        Self {
            fallback: config.fallback.clone(),
            license_file: (!file.is_empty()).then(|| PathBuf::from(file)),
            renewal_ttl: config.renewal.default_ttl(),
            renewal_url: config.renewal.renewal_url.clone(),
        }
    }
}

/// Validates, holds and publishes the server's current license.
pub struct LicenseManager {
    store: LicenseStore,
    eligibility: TrialEligibilityChecker,
    collaborators: Collaborators,
    policy: LicensePolicy,
    // Serializes storage writes with the matching slot swap. Readers of the
    // slot never take it.
    lifecycle: Mutex<()>,
}

impl LicenseManager {
    pub fn new(collaborators: Collaborators, policy: LicensePolicy) -> Self {
        Self {
            store: LicenseStore::new(),
            eligibility: TrialEligibilityChecker::new(collaborators.trial_history.clone()),
            collaborators,
            policy,
            lifecycle: Mutex::new(()),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Snapshot of the current license.
    pub fn license(&self) -> Option<Arc<License>> {
        self.store.current()
    }

    /// Client-safe projection of the current license.
    pub fn sanitized(&self) -> BTreeMap<String, String> {
        self.store.sanitized()
    }

    /// Full client projection, for privileged callers.
    pub fn client_license(&self) -> BTreeMap<String, String> {
        self.store.client_license()
    }

    pub fn add_listener<L>(&self, listener: L) -> ListenerId
    where
        L: LicenseListener + 'static,
    {
        self.store.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.store.remove_listener(id)
    }

    pub fn store(&self) -> &LicenseStore {
        &self.store
    }

    pub fn policy(&self) -> &LicensePolicy {
        &self.policy
    }

    // ------------------------------------------------------------------
    // Loading and installing
    // ------------------------------------------------------------------

    /// Load the license from the first available source.
    ///
    /// Returns the source of the license that was installed, or `None` when
    /// nothing was installed (no source, or the chosen source was rejected).
    pub async fn load_at_startup(&self) -> Option<LicenseSource> {
        let _lifecycle = self.lifecycle.lock().await;

        // The environment override wins, and a bad override does not fall through.
        if let Some(raw) = self.collaborators.overrides.license_override() {
            return self
                .load_from_source(raw.as_bytes(), LicenseSource::Environment)
                .await;
        }

        match self.collaborators.storage.get_license_record().await {
            Ok(Some(record)) => {
                return self
                    .load_from_source(&record.bytes, LicenseSource::Persisted)
                    .await;
            }
            Ok(None) => debug!("No persisted license record"),
            Err(e) => warn!(error = %e, "Failed to read persisted license; treating as absent"),
        }

        if let Some(path) = self.policy.license_file.clone() {
            match tokio::fs::read(&path).await {
                Ok(bytes) => return self.load_from_file(&bytes).await,
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read license file; treating as absent"
                ),
            }
        }

        if self.policy.fallback.enabled {
            let license = self.fallback_license();
            let id = license.id.clone();
            self.store.install(license);
            log_license_event(
                LicenseEvent::FallbackInstalled,
                &id,
                Some("no license source configured; enforcement disabled"),
            );
            return Some(LicenseSource::Fallback);
        }

        info!("No license found; running without a license");
        None
    }

    /// Validate `raw`, persist it, and install it as the current license.
    ///
    /// Non-sanctioned trials are checked for eligibility and the seat limit is
    /// compared with the active user count before anything is saved. Installs
    /// and removals run one at a time, so the persisted active record always
    /// matches the slot once a call returns.
    pub async fn install_from_bytes(&self, raw: &[u8]) -> LicenseResult<License> {
        let _lifecycle = self.lifecycle.lock().await;

        let license = match self.validate_candidate(raw).await {
            Ok(license) => license,
            Err(e) => {
                Self::log_rejection("install", &e);
                return Err(e);
            }
        };

        self.check_seat_limit(&license).await?;

        self.collaborators
            .storage
            .save_license_record(raw, &license)
            .await?;
        log_license_event(LicenseEvent::Persisted, &license.id, None);

        self.store.install(license.clone());
        log_license_event(LicenseEvent::Installed, &license.id, Some("install"));
        Ok(license)
    }

    /// Remove the current license and clear the persisted active marker.
    ///
    /// A no-op when no license is installed.
    pub async fn remove(&self) -> LicenseResult<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let Some(current) = self.store.current() else {
            debug!("Remove requested with no license installed");
            return Ok(());
        };

        self.collaborators.storage.clear_active_license().await?;
        self.store.remove();
        log_license_event(LicenseEvent::Removed, &current.id, None);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Trials
    // ------------------------------------------------------------------

    /// Ask the issuing authority for a trial license.
    ///
    /// Preconditions are checked before any lookup. The issued license is not
    /// installed here; it arrives later through the normal load path.
    pub async fn request_trial(
        &self,
        requester_id: &str,
        seats: u32,
        terms_accepted: bool,
        receive_emails_accepted: bool,
    ) -> LicenseResult<()> {
        let site = self.collaborators.site.snapshot();

        if site.restrict_system_admin {
            return Err(LicenseError::Restricted);
        }
        if !terms_accepted {
            return Err(LicenseError::PreconditionFailed(
                "terms of service must be accepted".to_string(),
            ));
        }
        if seats == 0 {
            return Err(LicenseError::PreconditionFailed(
                "seat count must be greater than zero".to_string(),
            ));
        }

        let requester = self
            .collaborators
            .directory
            .get_user(requester_id)
            .await
            .map_err(|e| match e {
                DirectoryError::NotFound(id) => LicenseError::IdentityNotFound(id),
                DirectoryError::Other(msg) => LicenseError::IdentityLookupFailed(msg),
            })?;

        let request = TrialLicenseRequest {
            server_id: site.server_id,
            name: requester.display_name(),
            email: requester.email,
            site_name: site.site_name,
            site_url: site.site_url,
            users: seats,
            terms_accepted,
            receive_emails_accepted,
        };

        self.collaborators
            .trial_sink
            .submit_trial_request(&request)
            .await
            .map_err(|e| match e {
                LicenseError::UpstreamUnavailable(_) => e,
                other => LicenseError::UpstreamUnavailable(other.to_string()),
            })?;

        log_license_event(
            LicenseEvent::TrialRequested,
            &request.server_id,
            Some(&format!("users={seats}")),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Renewal
    // ------------------------------------------------------------------

    /// Issue a renewal token for the current license.
    ///
    /// `ttl` defaults to the policy's renewal lifetime.
    pub async fn generate_renewal_token(&self, ttl: Option<Duration>) -> LicenseResult<String> {
        let license = self.store.current().ok_or(LicenseError::NoLicense)?;
        let codec = RenewalTokenCodec::from_provider(self.collaborators.keys.as_ref())?;

        let active_users = self.active_user_count().await?;
        let ttl = ttl.unwrap_or(self.policy.renewal_ttl);
        let token = codec.issue(&license.id, active_users, Some(ttl))?;

        log_license_event(
            LicenseEvent::RenewalTokenIssued,
            &license.id,
            Some(&format!("ttl_secs={}", ttl.as_secs())),
        );
        Ok(token)
    }

    /// Build a renewal link for the current license. Returns `(url, token)`.
    pub async fn generate_renewal_link(&self) -> LicenseResult<(String, String)> {
        let token = self.generate_renewal_token(None).await?;
        let url = format!("{}?token={}", self.policy.renewal_url, token);
        Ok((url, token))
    }

    /// Verify a renewal token issued by this server.
    pub fn verify_renewal_token(&self, token: &str) -> LicenseResult<RenewalClaims> {
        RenewalTokenCodec::from_provider(self.collaborators.keys.as_ref())?.verify(token)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Validate bytes and apply the one-trial-per-server rule.
    async fn validate_candidate(&self, raw: &[u8]) -> LicenseResult<License> {
        let validator = LicenseValidator::from_provider(self.collaborators.keys.as_ref())?;
        let license = validator.validate_bytes(raw)?;

        if license.is_restricted_trial() && !self.eligibility.can_start_trial(&license).await? {
            return Err(LicenseError::IneligibleTrial);
        }

        Ok(license)
    }

    async fn load_from_source(&self, raw: &[u8], source: LicenseSource) -> Option<LicenseSource> {
        match self.validate_candidate(raw).await {
            Ok(license) => {
                let id = license.id.clone();
                self.store.install(license);
                log_license_event(LicenseEvent::Installed, &id, Some(&source.to_string()));
                Some(source)
            }
            Err(e) => {
                Self::log_rejection(&source.to_string(), &e);
                None
            }
        }
    }

    /// A license file is saved to storage so later restarts find it there.
    async fn load_from_file(&self, raw: &[u8]) -> Option<LicenseSource> {
        let license = match self.validate_candidate(raw).await {
            Ok(license) => license,
            Err(e) => {
                Self::log_rejection("file", &e);
                return None;
            }
        };

        match self
            .collaborators
            .storage
            .save_license_record(raw, &license)
            .await
        {
            Ok(_) => log_license_event(LicenseEvent::Persisted, &license.id, Some("file")),
            Err(e) => warn!(
                license_id = %license.id,
                error = %e,
                "Failed to save license loaded from file"
            ),
        }

        let id = license.id.clone();
        self.store.install(license);
        log_license_event(LicenseEvent::Installed, &id, Some("file"));
        Some(LicenseSource::File)
    }

    async fn check_seat_limit(&self, license: &License) -> LicenseResult<()> {
        let Some(licensed) = license.features.users.filter(|users| *users > 0) else {
            return Ok(());
        };

        let active = self.active_user_count().await?;
        if active > licensed {
            return Err(LicenseError::SeatLimitExceeded { licensed, active });
        }
        Ok(())
    }

    async fn active_user_count(&self) -> LicenseResult<i64> {
        self.collaborators
            .directory
            .active_user_count()
            .await
            .map_err(|e| LicenseError::IdentityLookupFailed(e.to_string()))
    }

    fn log_rejection(source: &str, err: &LicenseError) {
        let event = match err {
            LicenseError::IneligibleTrial => LicenseEvent::TrialIneligible,
            _ => LicenseEvent::ValidationFailed,
        };
        log_license_event(event, source, Some(&err.to_string()));
    }

    fn fallback_license(&self) -> License {
        let fallback = &self.policy.fallback;
        let now = now_millis();

        License {
            id: Uuid::new_v4().simple().to_string(),
            issued_at: now,
            starts_at: now,
            expires_at: fallback.expires_at_ms.max(now),
            customer: Customer {
                name: fallback.customer_name.clone(),
                ..Customer::default()
            },
            features: Features::all_enabled(fallback.users),
            sku_name: fallback.sku_name.clone(),
            sku_short_name: SkuShortName::Enterprise,
            is_trial: false,
            is_sanctioned_trial: false,
            is_gov_sku: false,
        }
    }
}

impl std::fmt::Debug for LicenseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseManager")
            .field("store", &self.store)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Narrow license surface handed to other subsystems.
#[async_trait]
pub trait LicenseService: Send + Sync {
    fn name(&self) -> &'static str;

    fn license(&self) -> Option<Arc<License>>;

    async fn request_trial_license(
        &self,
        requester_id: &str,
        users: u32,
        terms_accepted: bool,
        receive_emails_accepted: bool,
    ) -> LicenseResult<()>;
}

#[async_trait]
impl LicenseService for LicenseManager {
    fn name(&self) -> &'static str {
        "license"
    }

    fn license(&self) -> Option<Arc<License>> {
        self.store.current()
    }

    async fn request_trial_license(
        &self,
        requester_id: &str,
        users: u32,
        terms_accepted: bool,
        receive_emails_accepted: bool,
    ) -> LicenseResult<()> {
        self.request_trial(requester_id, users, terms_accepted, receive_emails_accepted)
            .await
    }
}
