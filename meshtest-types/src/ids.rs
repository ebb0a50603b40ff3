//! Identifier types used throughout the harness.
//!
//! Document IDs and block CIDs are content-derived so that the same
//! scenario produces the same identifiers on every node and on every run.
//! Peer IDs are UUID v7, like any other runtime-assigned identity.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix carried by every document ID.
const DOC_ID_PREFIX: &str = "bae-";

/// CIDv1, dag-json codec, sha2-256 multihash of 32 bytes.
const CID_PREFIX: [u8; 4] = [0x01, 0x71, 0x12, 0x20];

/// Unique identifier for a document.
///
/// Derived from the collection root and the canonical JSON of the document's
/// initial field values, so creating the same document on two nodes yields
/// the same ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    /// Derives a document ID from its collection root and initial content.
    pub fn derive(root: CollectionRootId, content: &serde_json::Value) -> Result<Self> {
        // serde_json maps are ordered by key, which makes this canonical.
        let mut bytes = root.0.to_be_bytes().to_vec();
        bytes.extend(serde_json::to_vec(content)?);
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, &bytes);
        Ok(Self(format!("{DOC_ID_PREFIX}{uuid}")))
    }

    /// Parses a document ID from a string.
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s
            .strip_prefix(DOC_ID_PREFIX)
            .ok_or_else(|| Error::InvalidDocId(s.to_string()))?;
        Uuid::parse_str(raw)?;
        Ok(Self(s.to_string()))
    }

    /// Returns the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Content identifier of a block in a document's DAG.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Cid([u8; 32]);

impl Cid {
    /// Computes the CID of the given block bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Returns the sha2-256 digest.
    pub fn digest(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the binary CIDv1 encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = CID_PREFIX.to_vec();
        out.extend_from_slice(&self.0);
        out
    }

    /// Parses the multibase (base58btc) string form.
    pub fn parse(s: &str) -> Result<Self> {
        let encoded = s
            .strip_prefix('z')
            .ok_or_else(|| Error::InvalidCid(s.to_string()))?;
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| Error::InvalidCid(e.to_string()))?;
        if bytes.len() != CID_PREFIX.len() + 32 || bytes[..CID_PREFIX.len()] != CID_PREFIX {
            return Err(Error::InvalidCid(s.to_string()));
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes[CID_PREFIX.len()..]);
        Ok(Self(digest))
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z{}", bs58::encode(self.to_bytes()).into_string())
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({self})")
    }
}

impl FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.to_string()
    }
}

impl TryFrom<String> for Cid {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

/// Stable identifier shared by every version of a collection.
///
/// Renaming a collection or adding a field creates a new version but keeps
/// the root, which is what lets the harness keep collection indices stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionRootId(pub u32);

impl CollectionRootId {
    /// Derives a root from the canonical bytes of the definition that
    /// created the collection.
    pub fn derive(definition: &[u8]) -> Self {
        let digest = Sha256::digest(definition);
        Self(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
    }
}

impl fmt::Display for CollectionRootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-derived identifier of one collection version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionVersionId(String);

impl CollectionVersionId {
    /// Derives a version ID from the canonical definition bytes.
    pub fn derive(definition: &[u8]) -> Self {
        Self(Cid::of(definition).to_string())
    }

    /// Returns the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a node in the simulated network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Creates a new peer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a peer ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Where a node can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    /// The node's peer ID.
    pub peer_id: PeerId,
    /// Listen addresses, e.g. `mem://<peer>`.
    pub addrs: Vec<String>,
}

impl NodeAddr {
    /// Address of an in-process node.
    pub fn in_memory(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            addrs: vec![format!("mem://{peer_id}")],
        }
    }
}
