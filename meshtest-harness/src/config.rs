//! Harness configuration.
//!
//! Defaults run every case once against an in-memory node with no KMS.
//! [`HarnessConfig::from_env`] lets CI widen or narrow that selection.

use crate::error::{HarnessError, HarnessResult};
use meshtest_node::{DatabaseType, KmsType};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DATABASE_TYPE_ENV: &str = "MESHTEST_DATABASE_TYPE";
pub const KMS_TYPE_ENV: &str = "MESHTEST_KMS_TYPE";
pub const CLIENT_TYPE_ENV: &str = "MESHTEST_CLIENT_TYPE";
pub const SKIP_NETWORK_TESTS_ENV: &str = "MESHTEST_SKIP_NETWORK_TESTS";
pub const EVENT_TIMEOUT_ENV: &str = "MESHTEST_EVENT_TIMEOUT_MS";
pub const SYNC_TIMEOUT_ENV: &str = "MESHTEST_SYNC_TIMEOUT_MS";

/// How the harness talks to nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClientType {
    /// Direct calls into an in-process node.
    #[default]
    InProcess,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::InProcess => "in-process",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-process" => Ok(ClientType::InProcess),
            other => Err(HarnessError::Config(format!("unsupported client type: {other}"))),
        }
    }
}

/// Configuration shared by every test case run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Database types each case runs against.
    pub database_types: Vec<DatabaseType>,
    /// When set, KMS-enabled cases only run with this KMS type.
    pub kms_type: Option<KmsType>,
    pub client_type: ClientType,
    /// Skip cases that use peer connections, replicators or subscriptions.
    pub skip_network_tests: bool,
    /// How long to wait for a single update or replicator event.
    pub event_timeout: Duration,
    /// How long a sync wait may take overall.
    pub sync_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            database_types: vec![DatabaseType::Memory],
            kms_type: None,
            client_type: ClientType::InProcess,
            skip_network_tests: false,
            event_timeout: Duration::from_secs(5),
            sync_timeout: Duration::from_secs(30),
        }
    }
}

impl HarnessConfig {
    /// Builds a configuration from `MESHTEST_*` environment variables,
    /// falling back to the defaults for unset ones.
    pub fn from_env() -> HarnessResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(DATABASE_TYPE_ENV) {
            config.database_types = vec![parse_node_value(&value)?];
        }
        if let Some(value) = lookup(KMS_TYPE_ENV) {
            config.kms_type = Some(parse_node_value(&value)?);
        }
        if let Some(value) = lookup(CLIENT_TYPE_ENV) {
            config.client_type = value.parse()?;
        }
        if let Some(value) = lookup(SKIP_NETWORK_TESTS_ENV) {
            config.skip_network_tests = parse_bool(SKIP_NETWORK_TESTS_ENV, &value)?;
        }
        if let Some(value) = lookup(EVENT_TIMEOUT_ENV) {
            config.event_timeout = parse_millis(EVENT_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(SYNC_TIMEOUT_ENV) {
            config.sync_timeout = parse_millis(SYNC_TIMEOUT_ENV, &value)?;
        }
        Ok(config)
    }
}

fn parse_node_value<T>(value: &str) -> HarnessResult<T>
where
    T: FromStr<Err = meshtest_node::NodeError>,
{
    value
        .trim()
        .parse()
        .map_err(|e: meshtest_node::NodeError| HarnessError::Config(e.to_string()))
}

fn parse_bool(key: &str, value: &str) -> HarnessResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(HarnessError::Config(format!("{key}: expected a boolean, got {other}"))),
    }
}

fn parse_millis(key: &str, value: &str) -> HarnessResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| HarnessError::Config(format!("{key}: expected milliseconds, got {value}")))
}
