//! Structured logging for license lifecycle events.
//!
//! # Usage
//!
//! ```rust,ignore
//! use keystone::config::get_config;
//! use keystone::logging::init_logging;
//!
//! init_logging(&get_config()?.logging);
//! ```

use std::str::FromStr;

use tracing::{info, info_span, warn, Level};

use crate::config::LoggingConfig;

/// License state change event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// A validated license was installed into the current slot
    Installed,
    /// The current license was removed
    Removed,
    /// A license blob failed validation
    ValidationFailed,
    /// A trial license was refused by the one-trial-per-server rule
    TrialIneligible,
    /// A trial request was submitted upstream
    TrialRequested,
    /// A renewal token was issued
    RenewalTokenIssued,
    /// The unrestricted fallback license was installed
    FallbackInstalled,
    /// A license record was saved to storage
    Persisted,
}

impl LicenseEvent {
    /// Events worth an operator's attention are logged at `warn`.
    fn is_warning(&self) -> bool {
        matches!(
            self,
            LicenseEvent::ValidationFailed
                | LicenseEvent::TrialIneligible
                | LicenseEvent::FallbackInstalled
        )
    }
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Installed => "installed",
            LicenseEvent::Removed => "removed",
            LicenseEvent::ValidationFailed => "validation_failed",
            LicenseEvent::TrialIneligible => "trial_ineligible",
            LicenseEvent::TrialRequested => "trial_requested",
            LicenseEvent::RenewalTokenIssued => "renewal_token_issued",
            LicenseEvent::FallbackInstalled => "fallback_installed",
            LicenseEvent::Persisted => "persisted",
        };
        write!(f, "{}", s)
    }
}

/// Log a license state change event.
///
/// # Arguments
///
/// * `event` - The type of license event
/// * `license_id` - The license ID, or a source label when no license is known
/// * `details` - Optional additional details about the event
pub fn log_license_event(event: LicenseEvent, license_id: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license_id = %license_id,
    );
    let _enter = span.enter();

    if event.is_warning() {
        if let Some(d) = details {
            warn!(reason = %d, "License event occurred");
        } else {
            warn!("License event occurred");
        }
    } else if let Some(d) = details {
        info!(details = %d, "License event occurred");
    } else {
        info!("License event occurred");
    }
}

/// Install a global `tracing` subscriber according to `config`.
///
/// Does nothing when logging is disabled or a subscriber is already set.
/// Returns whether this call installed the subscriber.
pub fn init_logging(config: &LoggingConfig) -> bool {
    if !config.enabled {
        return false;
    }

    let level = Level::from_str(&config.level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok()
}
