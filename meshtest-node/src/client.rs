//! The client capability boundary.
//!
//! Everything the harness does to a node goes through [`Client`]. The
//! harness never sees a transport; any type implementing this trait can
//! stand in for a node.

use crate::acp::AacStatus;
use crate::config::NodeOptions;
use crate::error::NodeResult;
use crate::events::EventBus;
use crate::lens::LensConfig;
use crate::schema::CollectionDescription;
use async_trait::async_trait;
use meshtest_identity::PublicKey;
use meshtest_types::{Cid, DocId, NodeAddr, PeerId};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Handle of an open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Per-call context: who is calling and inside which transaction.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Bearer token issued for this node.
    pub token: Option<String>,
    pub txn: Option<TxnId>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_txn(mut self, txn: Option<TxnId>) -> Self {
        self.txn = txn;
        self
    }
}

/// Operations a node exposes to the harness.
#[async_trait]
pub trait Client: Send + Sync {
    /// The node's peer ID and addresses.
    fn peer_info(&self) -> NodeAddr;

    /// The node's event bus.
    fn events(&self) -> &EventBus;

    // ── Schema ───────────────────────────────────────────────────

    async fn add_schema(
        &self,
        ctx: &RequestContext,
        sdl: &str,
    ) -> NodeResult<Vec<CollectionDescription>>;

    /// Applies a JSON array of collection patch operations.
    async fn patch_collection(&self, ctx: &RequestContext, patch: &str) -> NodeResult<()>;

    async fn get_collections(&self, ctx: &RequestContext) -> NodeResult<Vec<CollectionDescription>>;

    async fn set_migration(&self, ctx: &RequestContext, config: LensConfig) -> NodeResult<()>;

    // ── Documents ────────────────────────────────────────────────

    async fn create_docs(
        &self,
        ctx: &RequestContext,
        collection: &str,
        docs: Vec<Value>,
        encrypted: bool,
    ) -> NodeResult<Vec<DocId>>;

    async fn update_doc(
        &self,
        ctx: &RequestContext,
        collection: &str,
        doc_id: &DocId,
        patch: Value,
    ) -> NodeResult<()>;

    async fn delete_doc(&self, ctx: &RequestContext, collection: &str, doc_id: &DocId)
    -> NodeResult<()>;

    /// Executes a read request, returning `{collection: [documents]}`.
    async fn exec_request(&self, ctx: &RequestContext, request: &str) -> NodeResult<Value>;

    /// The document's current head, if visible to the caller.
    async fn doc_head(
        &self,
        ctx: &RequestContext,
        collection: &str,
        doc_id: &DocId,
    ) -> NodeResult<Option<Cid>>;

    async fn verify_signature(
        &self,
        ctx: &RequestContext,
        cid: &Cid,
        public_key: &PublicKey,
    ) -> NodeResult<()>;

    // ── Access control ───────────────────────────────────────────

    /// Adds a document access policy and returns its ID.
    async fn add_dac_policy(&self, ctx: &RequestContext, policy: &str) -> NodeResult<String>;

    /// Returns true if the relationship already existed.
    async fn add_doc_actor_relationship(
        &self,
        ctx: &RequestContext,
        collection: &str,
        doc_id: &DocId,
        relation: &str,
        target_actor: &str,
    ) -> NodeResult<bool>;

    /// Returns true if a relationship was found and deleted.
    async fn delete_doc_actor_relationship(
        &self,
        ctx: &RequestContext,
        collection: &str,
        doc_id: &DocId,
        relation: &str,
        target_actor: &str,
    ) -> NodeResult<bool>;

    async fn disable_aac(&self, ctx: &RequestContext) -> NodeResult<()>;

    async fn re_enable_aac(&self, ctx: &RequestContext) -> NodeResult<()>;

    async fn get_aac_status(&self, ctx: &RequestContext) -> NodeResult<AacStatus>;

    // ── P2P ──────────────────────────────────────────────────────

    async fn connect(&self, addr: &NodeAddr) -> NodeResult<()>;

    async fn set_replicator(&self, addr: &NodeAddr) -> NodeResult<()>;

    async fn delete_replicator(&self, addr: &NodeAddr) -> NodeResult<()>;

    async fn get_all_replicators(&self) -> NodeResult<Vec<PeerId>>;

    async fn add_p2p_collections(&self, names: &[String]) -> NodeResult<()>;

    async fn remove_p2p_collections(&self, names: &[String]) -> NodeResult<()>;

    async fn get_all_p2p_collections(&self) -> NodeResult<Vec<String>>;

    async fn add_p2p_documents(&self, doc_ids: &[DocId]) -> NodeResult<()>;

    async fn remove_p2p_documents(&self, doc_ids: &[DocId]) -> NodeResult<()>;

    // ── Transactions & lifecycle ─────────────────────────────────

    async fn new_txn(&self) -> NodeResult<TxnId>;

    async fn commit_txn(&self, txn: TxnId) -> NodeResult<()>;

    async fn discard_txn(&self, txn: TxnId) -> NodeResult<()>;

    /// Stops the node. Its event bus closes and it leaves the network.
    async fn close(&self) -> NodeResult<()>;
}

/// Starts nodes.
#[async_trait]
pub trait NodeFactory: Send + Sync {
    /// Starts a node. Passing the peer ID of a closed node restarts it on
    /// its previous datastore.
    async fn start_node(&self, options: NodeOptions) -> NodeResult<Arc<dyn Client>>;
}
