//! Signing-key provider.
//!
//! The validator needs the issuer's Ed25519 public key and the renewal codec
//! needs an HMAC secret. Both come through [`KeyProvider`] so deployments can
//! source them from configuration, a secret store, or test fixtures.

use std::fmt;

use crate::config::KeysConfig;
use crate::errors::{LicenseError, LicenseResult};

/// Supplies key material to the validator and the renewal token codec.
pub trait KeyProvider: Send + Sync {
    /// Raw 32-byte Ed25519 public key of the license issuer.
    fn license_public_key(&self) -> Option<Vec<u8>>;

    /// Secret used to sign and verify renewal tokens.
    fn renewal_secret(&self) -> Option<Vec<u8>>;
}

/// Fixed key material resolved once at construction.
#[derive(Clone, Default)]
pub struct StaticKeys {
    license_public_key: Option<Vec<u8>>,
    renewal_secret: Option<Vec<u8>>,
}

impl StaticKeys {
    pub fn new(license_public_key: Option<Vec<u8>>, renewal_secret: Option<Vec<u8>>) -> Self {
        Self {
            license_public_key,
            renewal_secret,
        }
    }

    /// Resolve keys from configuration.
    ///
    /// The public key is hex-encoded. The renewal secret may use an `env:VAR`
    /// prefix to read the value from the environment. Empty values are
    /// treated as absent.
    pub fn from_config(config: &KeysConfig) -> LicenseResult<Self> {
        let license_public_key = if config.license_public_key.is_empty() {
            None
        } else {
            Some(hex::decode(&config.license_public_key).map_err(|e| {
                LicenseError::ConfigError(format!("license public key is not valid hex: {e}"))
            })?)
        };

        let secret = if let Some(env_var) = config.renewal_secret.strip_prefix("env:") {
            std::env::var(env_var).map_err(|_| {
                LicenseError::ConfigError(format!(
                    "environment variable '{env_var}' not found for renewal_secret"
                ))
            })?
        } else {
            config.renewal_secret.clone()
        };
        let renewal_secret = (!secret.is_empty()).then(|| secret.into_bytes());

        Ok(Self {
            license_public_key,
            renewal_secret,
        })
    }
}

impl KeyProvider for StaticKeys {
    fn license_public_key(&self) -> Option<Vec<u8>> {
        self.license_public_key.clone()
    }

    fn renewal_secret(&self) -> Option<Vec<u8>> {
        self.renewal_secret.clone()
    }
}

impl fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeys")
            .field(
                "license_public_key",
                &self.license_public_key.as_ref().map(hex::encode),
            )
            .field("renewal_secret", &self.renewal_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
