//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};

use keystone::config::FallbackConfig;
use keystone::directory::{DirectoryError, User, UserDirectory};
use keystone::errors::{LicenseError, LicenseResult};
use keystone::keys::StaticKeys;
use keystone::overrides::StaticOverride;
use keystone::site::SiteSnapshot;
use keystone::storage::InMemoryLicenseStorage;
use keystone::trial::{TrialHistory, TrialHistorySource};
use keystone::upstream::{TrialLicenseRequest, TrialRequestSink};
use keystone::{Collaborators, LicenseManager, LicensePolicy};

pub const RENEWAL_SECRET: &[u8] = b"renewal-secret-for-tests";

/// Signs license payloads the way the issuing authority does.
pub struct Issuer {
    pair: Ed25519KeyPair,
}

impl Issuer {
    pub fn new() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("keygen failed");
        Self {
            pair: Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("bad pkcs8"),
        }
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.pair.public_key().as_ref().to_vec()
    }

    /// base64(payload || signature)
    pub fn sign(&self, payload: &Value) -> Vec<u8> {
        let body = serde_json::to_vec(payload).expect("payload serializes");
        let mut blob = body.clone();
        blob.extend_from_slice(self.pair.sign(&body).as_ref());
        B64.encode(blob).into_bytes()
    }

    pub fn license(&self, id: &str) -> Vec<u8> {
        self.sign(&payload(id))
    }

    pub fn trial(&self, id: &str, sanctioned: bool) -> Vec<u8> {
        let mut body = payload(id);
        body["is_trial"] = json!(true);
        body["is_sanctioned_trial"] = json!(sanctioned);
        self.sign(&body)
    }

    pub fn with_users(&self, id: &str, users: i64) -> Vec<u8> {
        let mut body = payload(id);
        body["features"]["users"] = json!(users);
        self.sign(&body)
    }
}

/// A version 1 payload valid for a year from a fixed issue date.
pub fn payload(id: &str) -> Value {
    json!({
        "version": 1,
        "id": id,
        "issued_at": 1_700_000_000_000i64,
        "starts_at": 1_700_000_000_000i64,
        "expires_at": 4_000_000_000_000i64,
        "customer": {
            "id": "cust-1",
            "name": "Jane Doe",
            "email": "jane@example.com",
            "company": "Example Co"
        },
        "features": { "users": 100 },
        "sku_name": "Enterprise",
        "sku_short_name": "enterprise"
    })
}

/// Directory backed by a fixed user table.
#[derive(Default)]
pub struct MockDirectory {
    pub users: HashMap<String, User>,
    pub active_users: i64,
    pub failing: bool,
}

impl MockDirectory {
    pub fn with_admin() -> Self {
        let mut users = HashMap::new();
        users.insert(
            "admin".to_string(),
            User {
                id: "admin".to_string(),
                username: "sysadmin".to_string(),
                first_name: "Sam".to_string(),
                last_name: "Admin".to_string(),
                email: "sam@example.com".to_string(),
            },
        );
        Self {
            users,
            active_users: 12,
            failing: false,
        }
    }
}

#[async_trait]
impl UserDirectory for MockDirectory {
    async fn get_user(&self, id: &str) -> Result<User, DirectoryError> {
        if self.failing {
            return Err(DirectoryError::Other("directory offline".to_string()));
        }
        self.users
            .get(id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))
    }

    async fn active_user_count(&self) -> Result<i64, DirectoryError> {
        if self.failing {
            return Err(DirectoryError::Other("directory offline".to_string()));
        }
        Ok(self.active_users)
    }
}

/// Records every submitted trial request.
#[derive(Default)]
pub struct RecordingSink {
    pub requests: Mutex<Vec<TrialLicenseRequest>>,
    pub failing: bool,
}

impl RecordingSink {
    pub fn submitted(&self) -> Vec<TrialLicenseRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrialRequestSink for RecordingSink {
    async fn submit_trial_request(&self, request: &TrialLicenseRequest) -> LicenseResult<()> {
        if self.failing {
            return Err(LicenseError::UpstreamUnavailable("connection refused".into()));
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// History source that always fails.
pub struct BrokenHistory;

#[async_trait]
impl TrialHistorySource for BrokenHistory {
    async fn trial_history(&self) -> LicenseResult<TrialHistory> {
        Err(LicenseError::StorageError("history table missing".into()))
    }
}

/// A manager plus handles on its collaborators.
pub struct Harness {
    pub issuer: Issuer,
    pub storage: Arc<InMemoryLicenseStorage>,
    pub directory: Arc<MockDirectory>,
    pub sink: Arc<RecordingSink>,
    pub site: SiteSnapshot,
    pub override_value: Option<String>,
    pub policy: LicensePolicy,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            issuer: Issuer::new(),
            storage: Arc::new(InMemoryLicenseStorage::new()),
            directory: Arc::new(MockDirectory::with_admin()),
            sink: Arc::new(RecordingSink::default()),
            site: SiteSnapshot {
                server_id: "server-1".to_string(),
                site_name: "Example Chat".to_string(),
                site_url: "https://chat.example.com".to_string(),
                restrict_system_admin: false,
            },
            override_value: None,
            policy: LicensePolicy {
                fallback: FallbackConfig::default(),
                license_file: None,
                renewal_ttl: std::time::Duration::from_secs(3600),
                renewal_url: "https://customers.example.com/renew".to_string(),
            },
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            keys: Arc::new(StaticKeys::new(
                Some(self.issuer.public_key()),
                Some(RENEWAL_SECRET.to_vec()),
            )),
            storage: self.storage.clone(),
            trial_history: self.storage.clone(),
            directory: self.directory.clone(),
            trial_sink: self.sink.clone(),
            site: Arc::new(self.site.clone()),
            overrides: Arc::new(StaticOverride(self.override_value.clone())),
        }
    }

    pub fn manager(&self) -> LicenseManager {
        LicenseManager::new(self.collaborators(), self.policy.clone())
    }
}
