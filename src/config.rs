//! Configuration system for Keystone.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `keystone.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `KEYSTONE_LICENSE_ENV_VAR` - Name of the variable holding a license override
//! - `KEYSTONE_LICENSE_FILE` - Path to an on-disk license file
//! - `KEYSTONE_LICENSE_PUBLIC_KEY` - Hex-encoded Ed25519 issuer key
//! - `KEYSTONE_RENEWAL_SECRET` - Renewal token secret (`env:VAR` supported)
//! - `KEYSTONE_RENEWAL_TTL_SECS` - Default renewal token lifetime
//! - `KEYSTONE_RENEWAL_URL` - Base URL of the renewal page
//! - `KEYSTONE_TRIAL_URL` - Trial issuing endpoint
//! - `KEYSTONE_TRIAL_TIMEOUT_SECS` - Timeout for trial requests
//! - `KEYSTONE_SERVER_ID` - Server identity sent with trial requests
//! - `KEYSTONE_SITE_NAME` / `KEYSTONE_SITE_URL` - Site metadata
//! - `KEYSTONE_RESTRICT_SYSTEM_ADMIN` - Forbid trial requests on this deployment
//! - `KEYSTONE_FALLBACK_ENABLED` - Install the unrestricted fallback license
//! - `KEYSTONE_LOGGING_ENABLED` / `KEYSTONE_LOG_LEVEL` - Logging

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<KeystoneConfig> = OnceLock::new();

/// Default renewal token lifetime: 7 days.
pub const DEFAULT_RENEWAL_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeystoneConfig {
    pub license: LicenseConfig,
    pub keys: KeysConfig,
    pub renewal: RenewalConfig,
    pub trial: TrialConfig,
    pub site: SiteConfig,
    pub fallback: FallbackConfig,
    pub logging: LoggingConfig,
}

/// License source configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Environment variable consulted once at startup for a license override
    pub env_var: String,
    /// Optional license file read when no persisted record exists
    pub file_location: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            env_var: "KEYSTONE_LICENSE".to_string(),
            file_location: String::new(),
        }
    }
}

/// Key material.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Hex-encoded Ed25519 public key of the license issuer
    pub license_public_key: String,
    /// HMAC secret for renewal tokens (use `env:VAR_NAME` to read from environment)
    pub renewal_secret: String,
}

/// Renewal token configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenewalConfig {
    /// Token lifetime when the caller does not pass one
    pub default_ttl_secs: u64,
    /// Renewal page; the token is appended as `?token=`
    pub renewal_url: String,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_RENEWAL_TTL_SECS,
            renewal_url: "https://customers.example.com/subscribe/renew".to_string(),
        }
    }
}

impl RenewalConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Outbound trial request configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    /// Trial issuing endpoint
    pub request_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            request_url: "https://customers.example.com/api/v1/trials".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Site metadata read by trial requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Stable identity of this server installation
    pub server_id: String,
    pub site_name: String,
    pub site_url: String,
    /// When set, system admins may not request trials
    pub restrict_system_admin: bool,
}

/// Unrestricted fallback license installed when no license source is present.
///
/// Disabled by default: enabling it turns off license enforcement for the
/// whole deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub users: i64,
    pub sku_name: String,
    /// Expiration of the fallback license, epoch milliseconds
    pub expires_at_ms: i64,
    pub customer_name: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            users: 9999,
            sku_name: "Enterprise".to_string(),
            // 2100-01-01T00:00:00Z
            expires_at_ms: 4_102_444_800_000,
            customer_name: "Unlicensed Deployment".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl KeystoneConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `keystone.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        Self::load_from("keystone")
    }

    /// Load configuration using `file_stem` (without extension) as the optional config file.
    pub fn load_from(file_stem: &str) -> LicenseResult<Self> {
        let defaults = Self::default();

        let builder = Config::builder()
            // Start with defaults
            .set_default("license.env_var", defaults.license.env_var)
            .map_err(config_err)?
            .set_default("license.file_location", "")
            .map_err(config_err)?
            .set_default("keys.license_public_key", "")
            .map_err(config_err)?
            .set_default("keys.renewal_secret", "")
            .map_err(config_err)?
            .set_default("renewal.default_ttl_secs", DEFAULT_RENEWAL_TTL_SECS as i64)
            .map_err(config_err)?
            .set_default("renewal.renewal_url", defaults.renewal.renewal_url)
            .map_err(config_err)?
            .set_default("trial.request_url", defaults.trial.request_url)
            .map_err(config_err)?
            .set_default("trial.timeout_secs", defaults.trial.timeout_secs as i64)
            .map_err(config_err)?
            .set_default("site.server_id", "")
            .map_err(config_err)?
            .set_default("site.site_name", "")
            .map_err(config_err)?
            .set_default("site.site_url", "")
            .map_err(config_err)?
            .set_default("site.restrict_system_admin", false)
            .map_err(config_err)?
            .set_default("fallback.enabled", false)
            .map_err(config_err)?
            .set_default("fallback.users", defaults.fallback.users)
            .map_err(config_err)?
            .set_default("fallback.sku_name", defaults.fallback.sku_name)
            .map_err(config_err)?
            .set_default("fallback.expires_at_ms", defaults.fallback.expires_at_ms)
            .map_err(config_err)?
            .set_default("fallback.customer_name", defaults.fallback.customer_name)
            .map_err(config_err)?
            .set_default("logging.enabled", false)
            .map_err(config_err)?
            .set_default("logging.level", "info")
            .map_err(config_err)?
            // Load from keystone.toml (optional)
            .add_source(config::File::with_name(file_stem).required(false))
            // Override with environment variables
            .set_override_option("license.env_var", env::var("KEYSTONE_LICENSE_ENV_VAR").ok())
            .map_err(config_err)?
            .set_override_option("license.file_location", env::var("KEYSTONE_LICENSE_FILE").ok())
            .map_err(config_err)?
            .set_override_option(
                "keys.license_public_key",
                env::var("KEYSTONE_LICENSE_PUBLIC_KEY").ok(),
            )
            .map_err(config_err)?
            .set_override_option("keys.renewal_secret", env::var("KEYSTONE_RENEWAL_SECRET").ok())
            .map_err(config_err)?
            .set_override_option(
                "renewal.default_ttl_secs",
                env_parsed::<i64>("KEYSTONE_RENEWAL_TTL_SECS"),
            )
            .map_err(config_err)?
            .set_override_option("renewal.renewal_url", env::var("KEYSTONE_RENEWAL_URL").ok())
            .map_err(config_err)?
            .set_override_option("trial.request_url", env::var("KEYSTONE_TRIAL_URL").ok())
            .map_err(config_err)?
            .set_override_option(
                "trial.timeout_secs",
                env_parsed::<i64>("KEYSTONE_TRIAL_TIMEOUT_SECS"),
            )
            .map_err(config_err)?
            .set_override_option("site.server_id", env::var("KEYSTONE_SERVER_ID").ok())
            .map_err(config_err)?
            .set_override_option("site.site_name", env::var("KEYSTONE_SITE_NAME").ok())
            .map_err(config_err)?
            .set_override_option("site.site_url", env::var("KEYSTONE_SITE_URL").ok())
            .map_err(config_err)?
            .set_override_option(
                "site.restrict_system_admin",
                env_parsed::<bool>("KEYSTONE_RESTRICT_SYSTEM_ADMIN"),
            )
            .map_err(config_err)?
            .set_override_option(
                "fallback.enabled",
                env_parsed::<bool>("KEYSTONE_FALLBACK_ENABLED"),
            )
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("KEYSTONE_LOGGING_ENABLED"),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("KEYSTONE_LOG_LEVEL").ok())
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.license.env_var.trim().is_empty() {
            return Err(LicenseError::ConfigError(
                "license.env_var cannot be empty".to_string(),
            ));
        }

        if !self.keys.license_public_key.is_empty() {
            let decoded = hex::decode(&self.keys.license_public_key).map_err(|e| {
                LicenseError::ConfigError(format!("keys.license_public_key is not valid hex: {e}"))
            })?;
            if decoded.len() != 32 {
                return Err(LicenseError::ConfigError(format!(
                    "keys.license_public_key must be 32 bytes, got {}",
                    decoded.len()
                )));
            }
        }

        if self.renewal.default_ttl_secs == 0 {
            return Err(LicenseError::ConfigError(
                "renewal.default_ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.trial.timeout_secs == 0 {
            return Err(LicenseError::ConfigError(
                "trial.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.fallback.enabled && self.fallback.users <= 0 {
            return Err(LicenseError::ConfigError(
                "fallback.users must be greater than 0 when the fallback is enabled".to_string(),
            ));
        }

        // Validate log level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static KeystoneConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = KeystoneConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    Ok(CONFIG.get_or_init(|| config))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
pub fn init_config() -> LicenseResult<&'static KeystoneConfig> {
    get_config()
}
