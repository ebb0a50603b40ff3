//! Document blocks.
//!
//! A document is a grow-only set of blocks. Its state is the fold of its
//! blocks ordered by `(height, cid)`, and its head is the last block in that
//! order. Every node holding the same blocks therefore sees the same state
//! and head, whatever order the blocks arrived in.

use crate::error::{NodeError, NodeResult};
use meshtest_identity::{KeyType, PublicKey};
use meshtest_types::{Cid, CollectionRootId, CollectionVersionId, DocId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Signature attached to a block by the node that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSignature {
    pub key_type: KeyType,
    pub public_key: Vec<u8>,
    pub value: Vec<u8>,
}

/// One change to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub doc_id: DocId,
    pub collection_root: CollectionRootId,
    /// Collection version the change was written against.
    pub schema_version: CollectionVersionId,
    pub height: u64,
    pub fields: Map<String, Value>,
    pub is_delete: bool,
    pub encrypted: bool,
    /// Owner DID, set on the creating block of a policy-bound document.
    pub owner: Option<String>,
    pub parents: Vec<Cid>,
    /// Not part of the CID.
    #[serde(default)]
    pub signature: Option<BlockSignature>,
}

impl Block {
    /// Content identifier, computed over everything except the signature.
    pub fn cid(&self) -> NodeResult<Cid> {
        let unsigned = Block {
            signature: None,
            ..self.clone()
        };
        Ok(Cid::of(&serde_json::to_vec(&unsigned)?))
    }

    /// Checks the attached signature against the block's CID.
    pub fn verify_signature(&self, expected: Option<&PublicKey>) -> NodeResult<()> {
        let signature = self.signature.as_ref().ok_or(NodeError::MissingSignature)?;
        let signer = PublicKey::from_bytes(signature.key_type, &signature.public_key)?;
        if let Some(expected) = expected {
            if &signer != expected {
                return Err(NodeError::SignatureMismatch);
            }
        }
        signer
            .verify(&self.cid()?.to_bytes(), &signature.value)
            .map_err(|_| NodeError::SignatureMismatch)
    }
}

/// Stored blocks and metadata of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocRecord {
    pub collection_root: CollectionRootId,
    pub owner: Option<String>,
    pub encrypted: bool,
    /// False when the document is encrypted and this node holds no key.
    pub decryptable: bool,
    pub blocks: BTreeMap<Cid, Block>,
}

/// A document's folded state.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedDoc {
    pub doc_id: DocId,
    pub fields: Map<String, Value>,
    pub head: Cid,
    pub height: u64,
    /// Version of the block that produced the head.
    pub version: CollectionVersionId,
    pub deleted: bool,
}

impl DocRecord {
    pub(crate) fn new(block: &Block, decryptable: bool) -> Self {
        Self {
            collection_root: block.collection_root,
            owner: block.owner.clone(),
            encrypted: block.encrypted,
            decryptable,
            blocks: BTreeMap::new(),
        }
    }

    /// Inserts a block. Returns false if it was already present.
    pub(crate) fn insert(&mut self, cid: Cid, block: Block) -> bool {
        if self.owner.is_none() && block.owner.is_some() {
            self.owner = block.owner.clone();
        }
        if self.blocks.contains_key(&cid) {
            return false;
        }
        self.blocks.insert(cid, block);
        true
    }

    /// Folds the document's blocks.
    pub fn materialize(&self) -> Option<MaterializedDoc> {
        let mut ordered: Vec<(&Cid, &Block)> = self.blocks.iter().collect();
        ordered.sort_by(|(ca, a), (cb, b)| a.height.cmp(&b.height).then(ca.cmp(cb)));
        let (head_cid, head) = ordered.last().copied()?;

        let mut fields = Map::new();
        let mut deleted = false;
        for (_, block) in &ordered {
            deleted |= block.is_delete;
            for (k, v) in &block.fields {
                fields.insert(k.clone(), v.clone());
            }
        }
        Some(MaterializedDoc {
            doc_id: head.doc_id.clone(),
            fields,
            head: *head_cid,
            height: head.height,
            version: head.schema_version.clone(),
            deleted,
        })
    }

    /// Blocks in fold order.
    pub fn ordered_blocks(&self) -> Vec<Block> {
        let mut blocks: Vec<Block> = self.blocks.values().cloned().collect();
        blocks.sort_by_key(|b| b.height);
        blocks
    }
}
