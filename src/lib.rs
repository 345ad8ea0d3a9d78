//! Keystone - server-side license lifecycle management
//!
//! Keystone validates signed license blobs, keeps the server's current license
//! in a shared slot with change notifications, enforces the one-trial-per-server
//! rule and issues short-lived renewal tokens.
//!
//! # Features
//!
//! - `trial-http` - HTTP client for submitting trial requests. Enabled by default.
//!
//! # Example
//!
//! ```toml
//! # Use defaults (includes the HTTP trial client)
//! keystone-license = "0.1"
//!
//! # Bring your own trial request transport
//! keystone-license = { version = "0.1", default-features = false }
//! ```

// Core types and ambient concerns
pub mod config;
pub mod errors;
pub mod license;
pub mod logging;

// Verification and tokens
pub mod keys;
pub mod renewal;
pub mod validator;

// State and lifecycle
pub mod manager;
pub mod store;
pub mod trial;

// Host collaborators
pub mod directory;
pub mod overrides;
pub mod site;
pub mod storage;
pub mod upstream;

pub use errors::{LicenseError, LicenseResult};
pub use license::{Customer, Features, License, LicenseRecord, SkuShortName};
pub use manager::{Collaborators, LicenseManager, LicensePolicy, LicenseService, LicenseSource};
pub use renewal::{RenewalClaims, RenewalTokenCodec};
pub use store::{LicenseListener, LicenseStore, ListenerId};
pub use trial::{can_start_trial, TrialEligibilityChecker, TrialHistory, TrialRecord};
pub use validator::LicenseValidator;
