use meshtest_harness::config::{
    ClientType, DATABASE_TYPE_ENV, EVENT_TIMEOUT_ENV, KMS_TYPE_ENV, SKIP_NETWORK_TESTS_ENV,
    SYNC_TIMEOUT_ENV,
};
use meshtest_harness::{HarnessConfig, HarnessError};
use meshtest_node::{DatabaseType, KmsType};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::collections::HashMap;
use std::time::Duration;

fn from_pairs(pairs: &[(&str, &str)]) -> Result<HarnessConfig, HarnessError> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    HarnessConfig::from_lookup(|key| vars.get(key).cloned())
}

// ── Lookup ───────────────────────────────────────────────────────

#[test]
fn defaults_without_variables() {
    let config = from_pairs(&[]).unwrap();
    assert_eq!(config.database_types, vec![DatabaseType::Memory]);
    assert_eq!(config.kms_type, None);
    assert_eq!(config.client_type, ClientType::InProcess);
    assert!(!config.skip_network_tests);
    assert_eq!(config.event_timeout, Duration::from_secs(5));
    assert_eq!(config.sync_timeout, Duration::from_secs(30));
}

#[test]
fn variables_override_defaults() {
    let config = from_pairs(&[
        (DATABASE_TYPE_ENV, "file"),
        (KMS_TYPE_ENV, "pubsub"),
        (SKIP_NETWORK_TESTS_ENV, "true"),
        (EVENT_TIMEOUT_ENV, "250"),
        (SYNC_TIMEOUT_ENV, "1500"),
    ])
    .unwrap();
    assert_eq!(config.database_types, vec![DatabaseType::File]);
    assert_eq!(config.kms_type, Some(KmsType::PubSub));
    assert!(config.skip_network_tests);
    assert_eq!(config.event_timeout, Duration::from_millis(250));
    assert_eq!(config.sync_timeout, Duration::from_millis(1500));
}

#[test]
fn unknown_values_are_rejected() {
    for pair in [
        (DATABASE_TYPE_ENV, "postgres"),
        (KMS_TYPE_ENV, "vault"),
        ("MESHTEST_CLIENT_TYPE", "http"),
        (SKIP_NETWORK_TESTS_ENV, "maybe"),
        (SYNC_TIMEOUT_ENV, "soon"),
    ] {
        assert!(
            matches!(from_pairs(&[pair]), Err(HarnessError::Config(_))),
            "{pair:?} should be rejected"
        );
    }
}

// ── Environment ──────────────────────────────────────────────────

#[test]
#[serial]
fn from_env_reads_process_environment() {
    // SAFETY: every test touching the environment is serialized.
    unsafe {
        std::env::set_var(DATABASE_TYPE_ENV, "file");
        std::env::set_var(SKIP_NETWORK_TESTS_ENV, "1");
    }
    let config = HarnessConfig::from_env();
    unsafe {
        std::env::remove_var(DATABASE_TYPE_ENV);
        std::env::remove_var(SKIP_NETWORK_TESTS_ENV);
    }

    let config = config.unwrap();
    assert_eq!(config.database_types, vec![DatabaseType::File]);
    assert!(config.skip_network_tests);
}

#[test]
#[serial]
fn from_env_surfaces_bad_values() {
    // SAFETY: every test touching the environment is serialized.
    unsafe {
        std::env::set_var(EVENT_TIMEOUT_ENV, "-1");
    }
    let result = HarnessConfig::from_env();
    unsafe {
        std::env::remove_var(EVENT_TIMEOUT_ENV);
    }
    assert!(matches!(result, Err(HarnessError::Config(_))));
}
