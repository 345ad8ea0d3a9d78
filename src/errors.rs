//! Error types for license lifecycle operations.
//!
//! Every fallible operation in this crate returns [`LicenseResult`]. The
//! variants are grouped by the component that produces them so callers (for
//! example an HTTP layer) can translate them into client-facing responses
//! via [`LicenseError::kind_code`] without matching on message text.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type LicenseResult<T> = Result<T, LicenseError>;

#[derive(Debug, Error)]
pub enum LicenseError {
    // === Validation ===
    /// The license blob could not be decoded or parsed.
    #[error("malformed license: {0}")]
    MalformedLicense(String),

    /// A signature did not verify against the trusted key.
    #[error("invalid signature")]
    InvalidSignature,

    /// The license payload uses a schema version this build does not understand.
    #[error("unsupported license version: {0}")]
    UnsupportedVersion(u32),

    // === Renewal tokens ===
    /// The renewal token is past its expiration.
    #[error("renewal token has expired")]
    ExpiredToken,

    /// The renewal token could not be decoded.
    #[error("malformed renewal token: {0}")]
    MalformedToken(String),

    /// A token could not be signed (missing or unusable key).
    #[error("signing error: {0}")]
    SigningError(String),

    // === Trial eligibility ===
    /// A non-sanctioned trial was already issued for this server.
    #[error("trial license cannot be started more than once")]
    IneligibleTrial,

    /// Trial history could not be read; eligibility is unknown.
    #[error("trial history unavailable: {0}")]
    HistoryUnavailable(String),

    // === Trial requests ===
    /// A caller-supplied argument failed a precondition.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The deployment restricts system-admin operations such as trial requests.
    #[error("operation restricted on this deployment")]
    Restricted,

    /// The requester could not be found in the user directory.
    #[error("user not found: {0}")]
    IdentityNotFound(String),

    /// The user directory failed for a reason other than a missing user.
    #[error("user lookup failed: {0}")]
    IdentityLookupFailed(String),

    /// The trial-issuing authority could not be reached or refused the request.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    // === Lifecycle ===
    /// An operation needed a current license but none is installed.
    #[error("no license is installed")]
    NoLicense,

    /// The license allows fewer seats than the server already has active users.
    #[error("license allows {licensed} users but {active} are active")]
    SeatLimitExceeded { licensed: i64, active: i64 },

    // === Ambient ===
    #[error("storage error: {0}")]
    StorageError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl LicenseError {
    /// Stable machine-readable code for this error.
    pub fn kind_code(&self) -> &'static str {
        match self {
            LicenseError::MalformedLicense(_) => "MALFORMED_LICENSE",
            LicenseError::InvalidSignature => "INVALID_SIGNATURE",
            LicenseError::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            LicenseError::ExpiredToken => "EXPIRED_TOKEN",
            LicenseError::MalformedToken(_) => "MALFORMED_TOKEN",
            LicenseError::SigningError(_) => "SIGNING_ERROR",
            LicenseError::IneligibleTrial => "INELIGIBLE_TRIAL",
            LicenseError::HistoryUnavailable(_) => "HISTORY_UNAVAILABLE",
            LicenseError::PreconditionFailed(_) => "PRECONDITION_FAILED",
            LicenseError::Restricted => "RESTRICTED",
            LicenseError::IdentityNotFound(_) => "IDENTITY_NOT_FOUND",
            LicenseError::IdentityLookupFailed(_) => "IDENTITY_LOOKUP_FAILED",
            LicenseError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            LicenseError::NoLicense => "NO_LICENSE",
            LicenseError::SeatLimitExceeded { .. } => "SEAT_LIMIT_EXCEEDED",
            LicenseError::StorageError(_) => "STORAGE_ERROR",
            LicenseError::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Returns true if the error was caused by the caller's input rather than
    /// by the server or one of its collaborators.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            LicenseError::MalformedLicense(_)
                | LicenseError::InvalidSignature
                | LicenseError::UnsupportedVersion(_)
                | LicenseError::ExpiredToken
                | LicenseError::MalformedToken(_)
                | LicenseError::IneligibleTrial
                | LicenseError::PreconditionFailed(_)
                | LicenseError::Restricted
                | LicenseError::IdentityNotFound(_)
                | LicenseError::SeatLimitExceeded { .. }
        )
    }
}

#[cfg(feature = "trial-http")]
impl From<reqwest::Error> for LicenseError {
    fn from(err: reqwest::Error) -> Self {
        LicenseError::UpstreamUnavailable(err.to_string())
    }
}
