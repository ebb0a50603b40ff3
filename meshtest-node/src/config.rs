//! Node configuration.

use meshtest_identity::Identity;
use meshtest_types::PeerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::NodeError;

/// Backing store of a simulated node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// Kept in process memory; survives a restart within the same network.
    #[default]
    Memory,
    /// Snapshotted to `<root_dir>/datastore.json` when the node closes.
    File,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Memory => "memory",
            DatabaseType::File => "file",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(DatabaseType::Memory),
            "file" => Ok(DatabaseType::File),
            other => Err(NodeError::InvalidOptions(format!("unknown database type: {other}"))),
        }
    }
}

/// Key management for encrypted documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KmsType {
    /// No key exchange: encrypted documents received from peers stay sealed.
    #[default]
    None,
    /// Keys are exchanged over pubsub, so received documents can be decrypted.
    PubSub,
}

impl KmsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KmsType::None => "none",
            KmsType::PubSub => "pubsub",
        }
    }
}

impl fmt::Display for KmsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KmsType {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(KmsType::None),
            "pubsub" => Ok(KmsType::PubSub),
            other => Err(NodeError::InvalidOptions(format!("unknown kms type: {other}"))),
        }
    }
}

/// Options for starting a node.
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    /// Reuse an existing peer ID (and its datastore) when restarting.
    pub peer_id: Option<PeerId>,
    pub database: DatabaseType,
    /// Required for [`DatabaseType::File`].
    pub root_dir: Option<PathBuf>,
    pub kms: KmsType,
    /// The node's own identity. Signs blocks and administers admin ACP.
    pub identity: Option<Identity>,
    /// Enable admin access control with `identity` as the administrator.
    pub enable_aac: bool,
    /// Sign every block this node creates.
    pub enable_signing: bool,
}

impl NodeOptions {
    pub(crate) fn validate(&self) -> Result<(), NodeError> {
        if self.database == DatabaseType::File && self.root_dir.is_none() {
            return Err(NodeError::InvalidOptions(
                "file database requires a root directory".into(),
            ));
        }
        if self.enable_aac && self.identity.is_none() {
            return Err(NodeError::InvalidOptions(
                "admin acp requires a node identity".into(),
            ));
        }
        if self.enable_signing && self.identity.is_none() {
            return Err(NodeError::InvalidOptions(
                "block signing requires a node identity".into(),
            ));
        }
        Ok(())
    }
}
