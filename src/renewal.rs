//! Renewal tokens.
//!
//! A renewal token is a short-lived HS256 JWT proving which license is being
//! renewed and how many users are active, so a renewal flow can start without
//! re-sending the whole license.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::DEFAULT_RENEWAL_TTL_SECS;
use crate::errors::{LicenseError, LicenseResult};
use crate::keys::KeyProvider;

/// Default renewal token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(DEFAULT_RENEWAL_TTL_SECS);

/// Claims carried by a renewal token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalClaims {
    pub license_id: String,
    pub active_users: i64,
    /// Issued at (Unix timestamp, seconds)
    pub iat: u64,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: u64,
}

impl RenewalClaims {
    /// Token lifetime as encoded in the claims.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.exp.saturating_sub(self.iat))
    }
}

/// Issues and verifies renewal tokens with a shared secret.
#[derive(Clone)]
pub struct RenewalTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl RenewalTokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Build a codec from the provider's renewal secret.
    ///
    /// Fails with `SigningError` when no secret is available.
    pub fn from_provider(keys: &dyn KeyProvider) -> LicenseResult<Self> {
        match keys.renewal_secret() {
            Some(secret) if !secret.is_empty() => Ok(Self::new(&secret)),
            _ => Err(LicenseError::SigningError(
                "renewal signing key is not configured".to_string(),
            )),
        }
    }

    /// Issue a token for `license_id`. `ttl` defaults to [`DEFAULT_TOKEN_TTL`].
    pub fn issue(
        &self,
        license_id: &str,
        active_users: i64,
        ttl: Option<Duration>,
    ) -> LicenseResult<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| LicenseError::SigningError(format!("system time error: {e}")))?
            .as_secs();
        let ttl = ttl.unwrap_or(DEFAULT_TOKEN_TTL);

        let claims = RenewalClaims {
            license_id: license_id.to_string(),
            active_users,
            iat: now,
            exp: now.saturating_add(ttl.as_secs()),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| LicenseError::SigningError(format!("failed to sign token: {e}")))
    }

    /// Verify a token's signature and expiration and return its claims.
    pub fn verify(&self, token: &str) -> LicenseResult<RenewalClaims> {
        decode::<RenewalClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => LicenseError::ExpiredToken,
                ErrorKind::InvalidSignature => LicenseError::InvalidSignature,
                _ => LicenseError::MalformedToken(e.to_string()),
            })
    }
}

impl std::fmt::Debug for RenewalTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalTokenCodec")
            .field("algorithm", &Algorithm::HS256)
            .finish()
    }
}
