//! License data model.
//!
//! A [`License`] is an immutable value decoded from a signed blob. Expiry is a
//! derived predicate evaluated by readers: an expired license is still a valid
//! value and stays installed until it is removed or replaced.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Grace period after expiry during which enforcement is still relaxed.
pub const GRACE_PERIOD_MS: i64 = 10 * DAY_MS;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Feature flags known to this build. [`Features::set_defaults`] fills any
/// missing flag with the license's `future_features` value.
pub const KNOWN_FEATURES: &[&str] = &[
    "ldap",
    "ldap_groups",
    "mfa",
    "google_oauth",
    "office365_oauth",
    "openid",
    "compliance",
    "cluster",
    "metrics",
    "push_notifications",
    "saml",
    "elasticsearch",
    "announcement",
    "theme_management",
    "email_notification_contents",
    "data_retention",
    "message_export",
    "custom_permissions_schemes",
    "custom_terms_of_service",
    "guest_accounts",
    "guest_accounts_permissions",
    "lock_teammate_name_display",
    "shared_channels",
    "remote_cluster_service",
];

/// Keys removed from the client projection by [`License::sanitized`].
const SENSITIVE_CLIENT_KEYS: &[&str] = &[
    "Id",
    "Name",
    "Email",
    "Company",
    "IssuedAt",
    "StartsAt",
    "ExpiresAt",
    "SkuName",
];

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Customer metadata carried by a license. Never exposed to unprivileged clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub company: String,
}

/// Entitlements granted by a license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Seat limit. `None` means the license does not cap users.
    pub users: Option<i64>,
    /// Value applied to flags the license does not mention explicitly.
    pub future_features: bool,
    /// Individual feature flags keyed by name.
    pub flags: BTreeMap<String, bool>,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            users: None,
            future_features: true,
            flags: BTreeMap::new(),
        }
    }
}

impl Features {
    /// Every known feature enabled with the given seat limit.
    pub fn all_enabled(users: i64) -> Self {
        let mut features = Self {
            users: Some(users),
            future_features: true,
            flags: BTreeMap::new(),
        };
        features.set_defaults();
        features
    }

    /// Fill every known flag the license omits with `future_features`.
    pub fn set_defaults(&mut self) {
        for name in KNOWN_FEATURES {
            self.flags
                .entry((*name).to_string())
                .or_insert(self.future_features);
        }
    }

    /// Check whether a feature is enabled. Unknown names fall back to `future_features`.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(self.future_features)
    }
}

/// Short SKU classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkuShortName {
    Starter,
    Professional,
    Enterprise,
    E10,
    E20,
    #[default]
    #[serde(other)]
    Other,
}

impl fmt::Display for SkuShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkuShortName::Starter => "starter",
            SkuShortName::Professional => "professional",
            SkuShortName::Enterprise => "enterprise",
            SkuShortName::E10 => "e10",
            SkuShortName::E20 => "e20",
            SkuShortName::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// A decoded, signature-verified license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Unique license identifier.
    pub id: String,
    /// Issuance time, epoch milliseconds.
    #[serde(default)]
    pub issued_at: i64,
    /// Start of validity, epoch milliseconds.
    #[serde(default)]
    pub starts_at: i64,
    /// Expiration time, epoch milliseconds.
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub customer: Customer,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub sku_name: String,
    #[serde(default)]
    pub sku_short_name: SkuShortName,
    #[serde(default)]
    pub is_trial: bool,
    /// Sanctioned trials are exempt from the one-trial-per-server rule.
    #[serde(default)]
    pub is_sanctioned_trial: bool,
    #[serde(default)]
    pub is_gov_sku: bool,
}

impl License {
    /// Check the timestamp invariant: `expires_at >= issued_at` when both are set.
    pub fn has_consistent_timestamps(&self) -> bool {
        self.issued_at == 0 || self.expires_at == 0 || self.expires_at >= self.issued_at
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at < now_ms
    }

    /// Whether the license has expired as of now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// Whether the license's validity window has begun.
    pub fn is_started(&self) -> bool {
        self.starts_at <= now_millis()
    }

    /// Whether the license expired more than [`GRACE_PERIOD_MS`] ago.
    pub fn is_past_grace_period(&self) -> bool {
        now_millis() - self.expires_at > GRACE_PERIOD_MS
    }

    /// Whole days until expiry; zero once expired.
    pub fn days_to_expiration(&self) -> i64 {
        let remaining = self.expires_at - now_millis();
        if remaining <= 0 {
            0
        } else {
            remaining / DAY_MS
        }
    }

    /// A trial that falls under the one-trial-per-server restriction.
    pub fn is_restricted_trial(&self) -> bool {
        self.is_trial && !self.is_sanctioned_trial
    }

    /// Full client projection, including identity fields, for privileged callers.
    pub fn client_license(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();

        for name in KNOWN_FEATURES {
            props.insert(
                (*name).to_string(),
                self.features.is_enabled(name).to_string(),
            );
        }
        for (name, enabled) in &self.features.flags {
            props.insert(name.clone(), enabled.to_string());
        }

        // Fixed fields go last so a flag can never shadow them.
        props.insert("IsLicensed".to_string(), "true".to_string());
        props.insert("Id".to_string(), self.id.clone());
        props.insert("IssuedAt".to_string(), self.issued_at.to_string());
        props.insert("StartsAt".to_string(), self.starts_at.to_string());
        props.insert("ExpiresAt".to_string(), self.expires_at.to_string());
        props.insert("Name".to_string(), self.customer.name.clone());
        props.insert("Email".to_string(), self.customer.email.clone());
        props.insert("Company".to_string(), self.customer.company.clone());
        props.insert(
            "Users".to_string(),
            self.features.users.unwrap_or(0).to_string(),
        );
        props.insert("SkuName".to_string(), self.sku_name.clone());
        props.insert("SkuShortName".to_string(), self.sku_short_name.to_string());
        props.insert("IsTrial".to_string(), self.is_trial.to_string());
        props.insert("IsGovSku".to_string(), self.is_gov_sku.to_string());

        props
    }

    /// Client-safe projection: feature flags and non-sensitive fields only.
    pub fn sanitized(&self) -> BTreeMap<String, String> {
        let mut props = self.client_license();
        for key in SENSITIVE_CLIENT_KEYS {
            props.remove(*key);
        }
        props
    }
}

/// Persisted form of a license: the raw signed bytes plus the decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRecord {
    pub id: String,
    pub bytes: Vec<u8>,
    pub license: License,
    /// When the record was saved, epoch milliseconds.
    pub created_at: i64,
}
