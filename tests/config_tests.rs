use std::env;
use std::time::Duration;

use keystone::config::KeystoneConfig;
use keystone::keys::{KeyProvider, StaticKeys};
use keystone::LicensePolicy;
use serial_test::serial;

const VARS: &[&str] = &[
    "KEYSTONE_LICENSE_FILE",
    "KEYSTONE_RENEWAL_TTL_SECS",
    "KEYSTONE_RENEWAL_SECRET",
    "KEYSTONE_TRIAL_URL",
    "KEYSTONE_FALLBACK_ENABLED",
    "KEYSTONE_RESTRICT_SYSTEM_ADMIN",
    "KEYSTONE_TEST_SECRET",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn defaults_load_without_file_or_env() {
    clear_env();

    let config = KeystoneConfig::load_from("keystone-test-missing").unwrap();
    assert_eq!(config.license.env_var, "KEYSTONE_LICENSE");
    assert_eq!(config.renewal.default_ttl(), Duration::from_secs(7 * 24 * 3600));
    assert!(!config.fallback.enabled);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    clear_env();
    env::set_var("KEYSTONE_LICENSE_FILE", "/etc/keystone/license.txt");
    env::set_var("KEYSTONE_RENEWAL_TTL_SECS", "3600");
    env::set_var("KEYSTONE_TRIAL_URL", "https://issuer.example.com/trial");
    env::set_var("KEYSTONE_FALLBACK_ENABLED", "true");
    env::set_var("KEYSTONE_RESTRICT_SYSTEM_ADMIN", "true");

    let config = KeystoneConfig::load_from("keystone-test-missing").unwrap();
    assert_eq!(config.license.file_location, "/etc/keystone/license.txt");
    assert_eq!(config.renewal.default_ttl_secs, 3600);
    assert_eq!(config.trial.request_url, "https://issuer.example.com/trial");
    assert!(config.fallback.enabled);
    assert!(config.site.restrict_system_admin);

    let policy = LicensePolicy::from_config(&config);
    assert_eq!(policy.renewal_ttl, Duration::from_secs(3600));
    assert!(policy.fallback.enabled);

    clear_env();
}

#[test]
#[serial]
fn unparsable_numeric_env_is_ignored() {
    clear_env();
    env::set_var("KEYSTONE_RENEWAL_TTL_SECS", "soon");

    let config = KeystoneConfig::load_from("keystone-test-missing").unwrap();
    assert_eq!(config.renewal.default_ttl_secs, 7 * 24 * 3600);

    clear_env();
}

#[test]
#[serial]
fn renewal_secret_can_reference_another_variable() {
    clear_env();
    env::set_var("KEYSTONE_TEST_SECRET", "s3cr3t");
    env::set_var("KEYSTONE_RENEWAL_SECRET", "env:KEYSTONE_TEST_SECRET");

    let config = KeystoneConfig::load_from("keystone-test-missing").unwrap();
    let keys = StaticKeys::from_config(&config.keys).unwrap();
    assert_eq!(keys.renewal_secret().as_deref(), Some(&b"s3cr3t"[..]));
    assert!(keys.license_public_key().is_none());

    clear_env();
}
