//! The node's datastore.
//!
//! Holds everything a node persists: collections, document blocks, access
//! control state, migrations, replicators and P2P subscriptions. All
//! operations are synchronous; the node wraps the store in a mutex.

use crate::acp::{AdminAcp, DocumentAcp, Policy};
use crate::block::{Block, DocRecord, MaterializedDoc};
use crate::error::{NodeError, NodeResult};
use crate::lens::{migrate, Migration};
use crate::request::Selection;
use crate::schema::{CollectionDescription, CollectionPatch, TypeDefinition};
use meshtest_types::{Cid, CollectionRootId, DocId, PeerId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Persistent node state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    pub(crate) collections: Vec<CollectionDescription>,
    pub(crate) documents: BTreeMap<DocId, DocRecord>,
    pub(crate) policies: BTreeMap<String, Policy>,
    pub(crate) dac: DocumentAcp,
    pub(crate) aac: AdminAcp,
    pub(crate) migrations: Vec<Migration>,
    pub(crate) replicators: BTreeSet<PeerId>,
    pub(crate) p2p_collections: BTreeSet<CollectionRootId>,
    pub(crate) p2p_documents: BTreeSet<DocId>,
}

impl Database {
    // ── Collections ──────────────────────────────────────────────

    pub fn collection(&self, name: &str) -> NodeResult<&CollectionDescription> {
        self.collections
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| NodeError::CollectionNotFound(name.to_string()))
    }

    pub fn collection_by_root(&self, root: CollectionRootId) -> Option<&CollectionDescription> {
        self.collections.iter().find(|c| c.root_id == root)
    }

    pub(crate) fn add_types(
        &mut self,
        types: Vec<TypeDefinition>,
    ) -> NodeResult<Vec<CollectionDescription>> {
        for def in &types {
            if self.collections.iter().any(|c| c.name == def.name) {
                return Err(NodeError::CollectionExists(def.name.clone()));
            }
            if let Some(binding) = &def.policy {
                let policy = self
                    .policies
                    .get(&binding.id)
                    .ok_or_else(|| NodeError::PolicyNotFound(binding.id.clone()))?;
                if !policy.resources.contains(&binding.resource) {
                    return Err(NodeError::ResourceNotFound(binding.resource.clone()));
                }
            }
        }

        let mut created = Vec::with_capacity(types.len());
        for def in types {
            // Every node creating this definition derives the same root.
            let mut attempt = 0;
            let mut root = def.root_id(attempt)?;
            while self.collection_by_root(root).is_some() {
                attempt += 1;
                root = def.root_id(attempt)?;
            }
            let description = CollectionDescription::new(root, def)?;
            self.collections.push(description.clone());
            created.push(description);
        }
        Ok(created)
    }

    pub(crate) fn apply_patch(&mut self, patch: Vec<CollectionPatch>) -> NodeResult<()> {
        // Validate against a scratch copy so a failing step changes nothing.
        let mut scratch = self.collections.clone();
        for step in patch {
            let index = scratch
                .iter()
                .position(|c| c.name == step.collection())
                .ok_or_else(|| NodeError::CollectionNotFound(step.collection().to_string()))?;
            match step {
                CollectionPatch::Rename { name, .. } => {
                    if scratch.iter().any(|c| c.name == name) {
                        return Err(NodeError::CollectionExists(name));
                    }
                    scratch[index].name = name;
                }
                CollectionPatch::AddField { field, .. } => {
                    if scratch[index].field(&field.name).is_some() {
                        return Err(NodeError::FieldExists(field.name));
                    }
                    scratch[index].fields.push(field);
                }
            }
            scratch[index].bump_version()?;
        }
        self.collections = scratch;
        Ok(())
    }

    // ── Documents ────────────────────────────────────────────────

    pub fn materialize(&self, doc_id: &DocId) -> Option<MaterializedDoc> {
        self.documents.get(doc_id).and_then(DocRecord::materialize)
    }

    /// A live document `actor` may write, or `DocumentNotFound`.
    fn writable(&self, doc_id: &DocId, actor: Option<&str>) -> NodeResult<MaterializedDoc> {
        let record = self.documents.get(doc_id).ok_or(NodeError::DocumentNotFound)?;
        let doc = record.materialize().ok_or(NodeError::DocumentNotFound)?;
        if doc.deleted
            || !record.decryptable
            || !self.dac.can_write(doc_id, record.owner.as_deref(), actor)
        {
            return Err(NodeError::DocumentNotFound);
        }
        Ok(doc)
    }

    fn validate_fields(
        collection: &CollectionDescription,
        fields: &Map<String, Value>,
    ) -> NodeResult<()> {
        for (name, value) in fields {
            let def = collection
                .field(name)
                .ok_or_else(|| NodeError::FieldNotFound(name.clone()))?;
            if !def.kind.accepts(value) {
                return Err(NodeError::InvalidFieldValue {
                    field: name.clone(),
                    expected: def.kind.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Builds the creating block of a new document.
    pub(crate) fn build_create(
        &self,
        collection: &str,
        content: Value,
        encrypted: bool,
        actor: Option<&str>,
    ) -> NodeResult<Block> {
        let collection = self.collection(collection)?;
        let Value::Object(fields) = &content else {
            return Err(NodeError::InvalidRequest("document must be a JSON object".into()));
        };
        Self::validate_fields(collection, fields)?;

        let doc_id = DocId::derive(collection.root_id, &content)
            .map_err(|e| NodeError::InvalidRequest(e.to_string()))?;
        if self.documents.contains_key(&doc_id) {
            return Err(NodeError::DocumentExists(doc_id.to_string()));
        }
        let owner = match collection.policy {
            Some(_) => actor.map(str::to_string),
            None => None,
        };
        Ok(Block {
            doc_id,
            collection_root: collection.root_id,
            schema_version: collection.version_id.clone(),
            height: 1,
            fields: fields.clone(),
            is_delete: false,
            encrypted,
            owner,
            parents: Vec::new(),
            signature: None,
        })
    }

    /// Builds a block updating the given fields.
    pub(crate) fn build_update(
        &self,
        collection: &str,
        doc_id: &DocId,
        patch: Value,
        actor: Option<&str>,
    ) -> NodeResult<Block> {
        let collection = self.collection(collection)?;
        let Value::Object(fields) = patch else {
            return Err(NodeError::InvalidRequest("update must be a JSON object".into()));
        };
        Self::validate_fields(collection, &fields)?;
        let doc = self.writable(doc_id, actor)?;
        Ok(self.child_block(collection, doc, fields, false))
    }

    /// Builds a block deleting the document.
    pub(crate) fn build_delete(
        &self,
        collection: &str,
        doc_id: &DocId,
        actor: Option<&str>,
    ) -> NodeResult<Block> {
        let collection = self.collection(collection)?;
        let doc = self.writable(doc_id, actor)?;
        Ok(self.child_block(collection, doc, Map::new(), true))
    }

    fn child_block(
        &self,
        collection: &CollectionDescription,
        parent: MaterializedDoc,
        fields: Map<String, Value>,
        is_delete: bool,
    ) -> Block {
        let encrypted = self
            .documents
            .get(&parent.doc_id)
            .is_some_and(|r| r.encrypted);
        Block {
            doc_id: parent.doc_id,
            collection_root: collection.root_id,
            schema_version: collection.version_id.clone(),
            height: parent.height + 1,
            fields,
            is_delete,
            encrypted,
            owner: None,
            parents: vec![parent.head],
            signature: None,
        }
    }

    /// Stores a block. Returns false if it was already present.
    pub(crate) fn insert_block(&mut self, cid: Cid, block: Block, decryptable: bool) -> bool {
        self.documents
            .entry(block.doc_id.clone())
            .or_insert_with(|| DocRecord::new(&block, decryptable))
            .insert(cid, block)
    }

    pub(crate) fn find_block(&self, cid: &Cid) -> Option<&Block> {
        self.documents.values().find_map(|r| r.blocks.get(cid))
    }

    /// Whether a peer subscribed to, or holding, this document wants a block.
    pub(crate) fn wants(&self, block: &Block) -> bool {
        self.p2p_collections.contains(&block.collection_root)
            || self.p2p_documents.contains(&block.doc_id)
            || self.documents.contains_key(&block.doc_id)
    }

    // ── Requests ─────────────────────────────────────────────────

    /// Executes parsed selections. Documents are returned ordered by ID.
    pub(crate) fn query(&self, selections: &[Selection], actor: Option<&str>) -> NodeResult<Value> {
        let mut out = Map::new();
        for selection in selections {
            let collection = self.collection(&selection.collection)?;
            let mut rows = Vec::new();
            for (doc_id, record) in &self.documents {
                if record.collection_root != collection.root_id || !record.decryptable {
                    continue;
                }
                if let Some(ids) = &selection.doc_ids {
                    if !ids.iter().any(|id| id == doc_id.as_str()) {
                        continue;
                    }
                }
                if !self.dac.can_read(doc_id, record.owner.as_deref(), actor) {
                    continue;
                }
                let Some(mut doc) = record.materialize() else {
                    continue;
                };
                if doc.deleted {
                    continue;
                }
                migrate(
                    &self.migrations,
                    collection.root_id,
                    &doc.version,
                    &collection.version_id,
                    &mut doc.fields,
                );
                rows.push(Value::Object(project(&doc, &selection.fields)));
            }
            out.insert(selection.collection.clone(), Value::Array(rows));
        }
        Ok(Value::Object(out))
    }
}

fn project(doc: &MaterializedDoc, fields: &[String]) -> Map<String, Value> {
    fields
        .iter()
        .map(|name| {
            let value = match name.as_str() {
                "_docID" => Value::String(doc.doc_id.to_string()),
                "_head" => Value::String(doc.head.to_string()),
                "_version" => Value::String(doc.version.to_string()),
                other => doc.fields.get(other).cloned().unwrap_or(Value::Null),
            };
            (name.clone(), value)
        })
        .collect()
}
