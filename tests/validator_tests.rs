mod common;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use common::{payload, Issuer};
use keystone::keys::StaticKeys;
use keystone::{LicenseError, LicenseValidator, SkuShortName};
use serde_json::json;

#[test]
fn decodes_all_license_fields() {
    let issuer = Issuer::new();
    let validator = LicenseValidator::new(issuer.public_key());

    let mut body = payload("lic-full");
    body["features"]["flags"] = json!({ "ldap": true, "saml": false });
    body["is_gov_sku"] = json!(true);

    let license = validator.validate_bytes(&issuer.sign(&body)).unwrap();
    assert_eq!(license.id, "lic-full");
    assert_eq!(license.customer.company, "Example Co");
    assert_eq!(license.sku_short_name, SkuShortName::Enterprise);
    assert!(license.features.is_enabled("ldap"));
    assert!(!license.features.is_enabled("saml"));
    assert!(license.is_gov_sku);
    assert!(!license.is_trial);
}

#[test]
fn unknown_sku_short_name_is_tolerated() {
    let issuer = Issuer::new();
    let validator = LicenseValidator::new(issuer.public_key());

    let mut body = payload("lic-sku");
    body["sku_short_name"] = json!("platinum");

    let license = validator.validate_bytes(&issuer.sign(&body)).unwrap();
    assert_eq!(license.sku_short_name, SkuShortName::Other);
}

#[test]
fn flipped_payload_byte_fails_signature() {
    let issuer = Issuer::new();
    let validator = LicenseValidator::new(issuer.public_key());

    let mut blob = B64.decode(issuer.license("lic-tamper")).unwrap();
    blob[5] ^= 0x01;
    let raw = B64.encode(blob).into_bytes();

    assert!(matches!(
        validator.validate_bytes(&raw),
        Err(LicenseError::InvalidSignature)
    ));
}

#[test]
fn exactly_signature_length_is_malformed() {
    let validator = LicenseValidator::new(Issuer::new().public_key());
    let raw = B64.encode([7u8; 64]).into_bytes();

    assert!(matches!(
        validator.validate_bytes(&raw),
        Err(LicenseError::MalformedLicense(_))
    ));
}

#[test]
fn signed_garbage_payload_is_malformed() {
    let issuer = Issuer::new();
    let validator = LicenseValidator::new(issuer.public_key());
    let raw = issuer.sign(&json!(["not", "an", "object"]));

    assert!(matches!(
        validator.validate_bytes(&raw),
        Err(LicenseError::MalformedLicense(_))
    ));
}

#[test]
fn empty_id_is_malformed() {
    let issuer = Issuer::new();
    let validator = LicenseValidator::new(issuer.public_key());

    assert!(matches!(
        validator.validate_bytes(&issuer.license("  ")),
        Err(LicenseError::MalformedLicense(_))
    ));
}

#[test]
fn non_utf8_input_is_malformed() {
    let validator = LicenseValidator::new(Issuer::new().public_key());
    assert!(matches!(
        validator.validate_bytes(&[0xff, 0xfe, 0x00]),
        Err(LicenseError::MalformedLicense(_))
    ));
}

#[test]
fn validator_requires_configured_key() {
    let keys = StaticKeys::new(None, Some(b"secret".to_vec()));
    assert!(matches!(
        LicenseValidator::from_provider(&keys),
        Err(LicenseError::ConfigError(_))
    ));
}
