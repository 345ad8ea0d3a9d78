//! Signed license validation.
//!
//! A license blob is standard base64 of `payload || signature`, where the
//! signature is a 64-byte Ed25519 signature over the JSON payload bytes. The
//! payload carries a schema `version` alongside the license fields.
//!
//! Validation is pure computation: no shared state is touched, so a single
//! [`LicenseValidator`] can be used from any number of threads.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use ring::signature::{UnparsedPublicKey, ED25519};
use serde::Deserialize;

use crate::errors::{LicenseError, LicenseResult};
use crate::keys::KeyProvider;
use crate::license::License;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Payload schema versions this build can decode.
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Just enough of the payload to dispatch on its schema version.
#[derive(Deserialize)]
struct PayloadEnvelope {
    version: u32,
}

/// Verifies license blobs against a trusted issuer key.
#[derive(Clone)]
pub struct LicenseValidator {
    public_key: Vec<u8>,
}

impl LicenseValidator {
    /// Create a validator for the given raw Ed25519 public key.
    pub fn new(public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            public_key: public_key.into(),
        }
    }

    /// Create a validator from a key provider.
    pub fn from_provider(keys: &dyn KeyProvider) -> LicenseResult<Self> {
        keys.license_public_key().map(Self::new).ok_or_else(|| {
            LicenseError::ConfigError("license public key is not configured".to_string())
        })
    }

    /// Parse, verify and decode a signed license blob.
    pub fn validate_bytes(&self, raw: &[u8]) -> LicenseResult<License> {
        let (payload, signature) = split_signed(raw)?;

        UnparsedPublicKey::new(&ED25519, &self.public_key)
            .verify(&payload, &signature)
            .map_err(|_| LicenseError::InvalidSignature)?;

        let envelope: PayloadEnvelope = serde_json::from_slice(&payload)
            .map_err(|e| LicenseError::MalformedLicense(format!("unreadable payload: {e}")))?;
        if !SUPPORTED_VERSIONS.contains(&envelope.version) {
            return Err(LicenseError::UnsupportedVersion(envelope.version));
        }

        let license: License = serde_json::from_slice(&payload)
            .map_err(|e| LicenseError::MalformedLicense(format!("invalid license fields: {e}")))?;

        if license.id.trim().is_empty() {
            return Err(LicenseError::MalformedLicense(
                "license id is empty".to_string(),
            ));
        }
        if !license.has_consistent_timestamps() {
            return Err(LicenseError::MalformedLicense(format!(
                "expires_at {} precedes issued_at {}",
                license.expires_at, license.issued_at
            )));
        }

        Ok(license)
    }
}

impl std::fmt::Debug for LicenseValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseValidator")
            .field("public_key", &hex::encode(&self.public_key))
            .finish()
    }
}

/// Decode the base64 blob and split it into payload and signature.
fn split_signed(raw: &[u8]) -> LicenseResult<(Vec<u8>, Vec<u8>)> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| LicenseError::MalformedLicense("license is not valid UTF-8".to_string()))?;

    let mut decoded = B64
        .decode(text.trim())
        .map_err(|e| LicenseError::MalformedLicense(format!("invalid base64: {e}")))?;

    if decoded.len() <= SIGNATURE_LEN {
        return Err(LicenseError::MalformedLicense(
            "signed license not long enough".to_string(),
        ));
    }

    let signature = decoded.split_off(decoded.len() - SIGNATURE_LEN);
    Ok((decoded, signature))
}
