//! The simulated node.
//!
//! A [`SimNode`] implements [`Client`] over an in-memory [`Database`]. Local
//! writes publish `Update` events and push their blocks to replicator
//! targets and to connected peers that want them. Blocks from peers arrive
//! through an inbox processed by a background task, which merges them and
//! publishes `MergeComplete`.

use crate::acp::AacStatus;
use crate::block::{Block, BlockSignature};
use crate::client::{Client, RequestContext, TxnId};
use crate::config::{DatabaseType, KmsType, NodeOptions};
use crate::db::Database;
use crate::error::{NodeError, NodeResult};
use crate::events::EventBus;
use crate::lens::{LensConfig, Migration};
use crate::network::{NetworkInner, DATASTORE_FILE};
use crate::request::parse_request;
use crate::schema::{parse_patch, parse_sdl, CollectionDescription};
use async_trait::async_trait;
use meshtest_identity::{verify_token, PublicKey};
use meshtest_types::{
    Cid, DocId, MergeCompleteEvent, NodeAddr, NodeEvent, PeerId, ReplicatorCompletedEvent,
    UpdateEvent,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Messages delivered to a node's inbox.
enum Inbound {
    Block { from: PeerId, cid: Cid, block: Block },
    /// Acknowledged once every earlier message has been processed.
    Barrier(oneshot::Sender<()>),
}

/// Uncommitted work of one transaction.
#[derive(Default)]
struct TxnState {
    blocks: Vec<(Cid, Block)>,
    /// Committed head of each touched document when first touched.
    touched: HashMap<DocId, Option<Cid>>,
    migrations: Vec<Migration>,
}

/// An in-process database node.
pub struct SimNode {
    peer_id: PeerId,
    options: NodeOptions,
    db: Arc<Mutex<Database>>,
    txns: Mutex<HashMap<TxnId, TxnState>>,
    next_txn: AtomicU64,
    events: Arc<EventBus>,
    peers: Mutex<BTreeSet<PeerId>>,
    network: Weak<NetworkInner>,
    inbox: Mutex<Option<mpsc::UnboundedSender<Inbound>>>,
    closed: AtomicBool,
}

impl fmt::Debug for SimNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimNode")
            .field("peer_id", &self.peer_id)
            .field("database", &self.options.database)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl SimNode {
    pub(crate) fn spawn(
        peer_id: PeerId,
        options: NodeOptions,
        db: Arc<Mutex<Database>>,
        network: Weak<NetworkInner>,
    ) -> Arc<Self> {
        if options.enable_aac {
            if let Some(identity) = &options.identity {
                db.lock().aac.configure(identity.did());
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let node = Arc::new(Self {
            peer_id,
            options,
            db,
            txns: Mutex::new(HashMap::new()),
            next_txn: AtomicU64::new(0),
            events: Arc::new(EventBus::new()),
            peers: Mutex::new(BTreeSet::new()),
            network,
            inbox: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
        });
        tokio::spawn(run_inbox(node.clone(), rx));
        node
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Peers this node is connected to.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.peers.lock().iter().copied().collect()
    }

    fn ensure_open(&self) -> NodeResult<()> {
        if self.is_closed() {
            return Err(NodeError::Closed);
        }
        Ok(())
    }

    /// Resolves the caller's DID from the request token.
    fn actor(&self, ctx: &RequestContext) -> NodeResult<Option<String>> {
        ctx.token
            .as_deref()
            .map(|token| Ok(verify_token(token, &self.peer_id.to_string())?.sub))
            .transpose()
    }

    /// Opens a guarded operation: the node must be open and admin ACP must
    /// admit the caller.
    fn guard(&self, ctx: &RequestContext) -> NodeResult<Option<String>> {
        self.ensure_open()?;
        let actor = self.actor(ctx)?;
        self.db.lock().aac.check(actor.as_deref())?;
        Ok(actor)
    }

    fn deliver(&self, message: Inbound) -> bool {
        match self.inbox.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    fn sign(&self, block: &mut Block, cid: &Cid) {
        if !self.options.enable_signing {
            return;
        }
        if let Some(identity) = &self.options.identity {
            block.signature = Some(BlockSignature {
                key_type: identity.key_type(),
                public_key: identity.public_key().to_bytes(),
                value: identity.sign(&cid.to_bytes()),
            });
        }
    }

    /// A read view for `txn`: committed state plus the transaction's blocks.
    ///
    /// Migrations staged in the transaction are not part of the view, so a
    /// request in the same transaction does not see them until commit.
    fn txn_view(&self, state: &TxnState) -> Database {
        let mut view = self.db.lock().clone();
        for (cid, block) in &state.blocks {
            view.insert_block(*cid, block.clone(), true);
        }
        view
    }

    /// Builds a block against the right view and either applies it or
    /// stages it in the caller's transaction.
    fn write<F>(&self, ctx: &RequestContext, build: F) -> NodeResult<DocId>
    where
        F: FnOnce(&Database, Option<&str>) -> NodeResult<Block>,
    {
        let actor = self.guard(ctx)?;
        match ctx.txn {
            None => {
                let mut block = build(&self.db.lock(), actor.as_deref())?;
                let cid = block.cid()?;
                self.sign(&mut block, &cid);
                let doc_id = block.doc_id.clone();
                self.apply_local(vec![(cid, block)]);
                Ok(doc_id)
            }
            Some(txn) => {
                let mut txns = self.txns.lock();
                let state = txns.get_mut(&txn).ok_or(NodeError::TxnNotFound(txn.0))?;
                let view = self.txn_view(state);
                let mut block = build(&view, actor.as_deref())?;
                let cid = block.cid()?;
                self.sign(&mut block, &cid);
                let doc_id = block.doc_id.clone();
                let committed_head = self.db.lock().materialize(&doc_id).map(|d| d.head);
                state.touched.entry(doc_id.clone()).or_insert(committed_head);
                state.blocks.push((cid, block));
                Ok(doc_id)
            }
        }
    }

    /// Stores local blocks, publishes `Update` events and pushes to peers.
    fn apply_local(&self, blocks: Vec<(Cid, Block)>) {
        let mut events = Vec::with_capacity(blocks.len());
        {
            let mut db = self.db.lock();
            for (cid, block) in &blocks {
                db.insert_block(*cid, block.clone(), true);
                events.push(UpdateEvent {
                    doc_id: block.doc_id.clone(),
                    collection_root: block.collection_root,
                    cid: *cid,
                    is_create: block.parents.is_empty(),
                });
            }
        }
        for event in events {
            debug!("Node {} updated {} -> {}", self.peer_id, event.doc_id, event.cid);
            self.events.publish(NodeEvent::Update(event));
        }
        for (cid, block) in blocks {
            self.push(cid, block);
        }
    }

    /// Sends a block to replicator targets and interested connected peers.
    fn push(&self, cid: Cid, block: Block) {
        let Some(network) = self.network.upgrade() else {
            return;
        };
        let replicators = self.db.lock().replicators.clone();
        let peers = self.peers.lock().clone();

        for target in network.running_nodes() {
            if target.peer_id == self.peer_id {
                continue;
            }
            let wanted = replicators.contains(&target.peer_id)
                || (peers.contains(&target.peer_id) && target.db.lock().wants(&block));
            if wanted {
                debug!("Node {} pushing {} to {}", self.peer_id, cid, target.peer_id);
                target.deliver(Inbound::Block {
                    from: self.peer_id,
                    cid,
                    block: block.clone(),
                });
            }
        }
    }

    /// Merges a block received from a peer.
    fn merge(&self, from: PeerId, cid: Cid, block: Block) {
        match block.cid() {
            Ok(actual) if actual == cid => {}
            _ => {
                warn!("Node {} dropped block {} from {}: CID mismatch", self.peer_id, cid, from);
                return;
            }
        }
        if block.signature.is_some() {
            if let Err(e) = block.verify_signature(None) {
                warn!("Node {} dropped block {} from {}: {}", self.peer_id, cid, from, e);
                return;
            }
        }

        let decryptable = !block.encrypted || self.options.kms == KmsType::PubSub;
        let doc_id = block.doc_id.clone();
        let collection_root = block.collection_root;
        let decrypted = {
            let mut db = self.db.lock();
            if db.collection_by_root(collection_root).is_none() {
                warn!("Node {} has no collection {} for {}", self.peer_id, collection_root, doc_id);
                return;
            }
            if !db.insert_block(cid, block, decryptable) {
                return;
            }
            db.documents.get(&doc_id).is_some_and(|r| r.decryptable)
        };

        debug!("Node {} merged {} block {} from {}", self.peer_id, doc_id, cid, from);
        self.events.publish(NodeEvent::MergeComplete(MergeCompleteEvent {
            doc_id,
            collection_root,
            cid,
            by_peer: from,
            decrypted,
        }));
    }

    fn target(&self, addr: &NodeAddr) -> NodeResult<Arc<SimNode>> {
        self.network
            .upgrade()
            .and_then(|n| n.node(&addr.peer_id))
            .filter(|n| n.peer_id != self.peer_id)
            .ok_or_else(|| NodeError::PeerNotFound(addr.peer_id.to_string()))
    }

    fn link(&self, other: &SimNode) {
        self.peers.lock().insert(other.peer_id);
        other.peers.lock().insert(self.peer_id);
    }

    fn resolve_roots(&self, names: &[String]) -> NodeResult<Vec<meshtest_types::CollectionRootId>> {
        let db = self.db.lock();
        names
            .iter()
            .map(|name| db.collection(name).map(|c| c.root_id))
            .collect()
    }

    /// Common checks for relationship changes. Returns the caller's DID.
    fn relationship_guard(
        &self,
        ctx: &RequestContext,
        collection: &str,
        doc_id: &DocId,
    ) -> NodeResult<String> {
        let actor = self.guard(ctx)?.ok_or(NodeError::MissingIdentity)?;
        let db = self.db.lock();
        let description = db.collection(collection)?;
        if description.policy.is_none() {
            return Err(NodeError::NoPolicy(collection.to_string()));
        }
        let record = db.documents.get(doc_id).ok_or(NodeError::DocumentNotFound)?;
        if record.owner.as_deref() != Some(actor.as_str()) {
            return Err(NodeError::NotOwner);
        }
        Ok(actor)
    }
}

async fn run_inbox(node: Arc<SimNode>, mut rx: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(message) = rx.recv().await {
        match message {
            Inbound::Block { from, cid, block } => node.merge(from, cid, block),
            Inbound::Barrier(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("Node {} inbox closed", node.peer_id);
}

#[async_trait]
impl Client for SimNode {
    fn peer_info(&self) -> NodeAddr {
        NodeAddr::in_memory(self.peer_id)
    }

    fn events(&self) -> &EventBus {
        &self.events
    }

    // ── Schema ───────────────────────────────────────────────────

    async fn add_schema(
        &self,
        ctx: &RequestContext,
        sdl: &str,
    ) -> NodeResult<Vec<CollectionDescription>> {
        self.guard(ctx)?;
        let types = parse_sdl(sdl)?;
        let created = self.db.lock().add_types(types)?;
        debug!("Node {} added {} collection(s)", self.peer_id, created.len());
        Ok(created)
    }

    async fn patch_collection(&self, ctx: &RequestContext, patch: &str) -> NodeResult<()> {
        self.guard(ctx)?;
        let patch = parse_patch(patch)?;
        self.db.lock().apply_patch(patch)
    }

    async fn get_collections(&self, _ctx: &RequestContext) -> NodeResult<Vec<CollectionDescription>> {
        self.ensure_open()?;
        Ok(self.db.lock().collections.clone())
    }

    async fn set_migration(&self, ctx: &RequestContext, config: LensConfig) -> NodeResult<()> {
        self.guard(ctx)?;
        let migration = {
            let db = self.db.lock();
            let collection = db.collection(&config.collection)?;
            for version in [&config.source_version, &config.destination_version] {
                if !collection.versions().contains(&version) {
                    return Err(NodeError::VersionNotFound(version.to_string()));
                }
            }
            Migration {
                collection_root: collection.root_id,
                source_version: config.source_version,
                destination_version: config.destination_version,
                ops: config.ops,
            }
        };

        let install = |migrations: &mut Vec<Migration>| {
            migrations.retain(|m| {
                m.collection_root != migration.collection_root
                    || m.source_version != migration.source_version
            });
            migrations.push(migration.clone());
        };
        match ctx.txn {
            None => install(&mut self.db.lock().migrations),
            Some(txn) => {
                let mut txns = self.txns.lock();
                let state = txns.get_mut(&txn).ok_or(NodeError::TxnNotFound(txn.0))?;
                install(&mut state.migrations);
            }
        }
        Ok(())
    }

    // ── Documents ────────────────────────────────────────────────

    async fn create_docs(
        &self,
        ctx: &RequestContext,
        collection: &str,
        docs: Vec<Value>,
        encrypted: bool,
    ) -> NodeResult<Vec<DocId>> {
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            ids.push(self.write(ctx, |db, actor| {
                db.build_create(collection, doc, encrypted, actor)
            })?);
        }
        Ok(ids)
    }

    async fn update_doc(
        &self,
        ctx: &RequestContext,
        collection: &str,
        doc_id: &DocId,
        patch: Value,
    ) -> NodeResult<()> {
        self.write(ctx, |db, actor| db.build_update(collection, doc_id, patch, actor))?;
        Ok(())
    }

    async fn delete_doc(
        &self,
        ctx: &RequestContext,
        collection: &str,
        doc_id: &DocId,
    ) -> NodeResult<()> {
        self.write(ctx, |db, actor| db.build_delete(collection, doc_id, actor))?;
        Ok(())
    }

    async fn exec_request(&self, ctx: &RequestContext, request: &str) -> NodeResult<Value> {
        let actor = self.guard(ctx)?;
        let selections = parse_request(request)?;
        match ctx.txn {
            None => self.db.lock().query(&selections, actor.as_deref()),
            Some(txn) => {
                let txns = self.txns.lock();
                let state = txns.get(&txn).ok_or(NodeError::TxnNotFound(txn.0))?;
                self.txn_view(state).query(&selections, actor.as_deref())
            }
        }
    }

    async fn doc_head(
        &self,
        ctx: &RequestContext,
        collection: &str,
        doc_id: &DocId,
    ) -> NodeResult<Option<Cid>> {
        let actor = self.guard(ctx)?;
        let db = self.db.lock();
        let root = db.collection(collection)?.root_id;
        let Some(record) = db.documents.get(doc_id) else {
            return Ok(None);
        };
        if record.collection_root != root
            || !db.dac.can_read(doc_id, record.owner.as_deref(), actor.as_deref())
        {
            return Ok(None);
        }
        Ok(record.materialize().map(|d| d.head))
    }

    async fn verify_signature(
        &self,
        _ctx: &RequestContext,
        cid: &Cid,
        public_key: &PublicKey,
    ) -> NodeResult<()> {
        self.ensure_open()?;
        let db = self.db.lock();
        let block = db
            .find_block(cid)
            .ok_or_else(|| NodeError::BlockNotFound(cid.to_string()))?;
        block.verify_signature(Some(public_key))
    }

    // ── Access control ───────────────────────────────────────────

    async fn add_dac_policy(&self, ctx: &RequestContext, policy: &str) -> NodeResult<String> {
        let actor = self.guard(ctx)?.ok_or(NodeError::MissingIdentity)?;
        let policy = crate::acp::Policy::parse(policy, &actor)?;
        let id = policy.id()?;
        self.db.lock().policies.insert(id.clone(), policy);
        debug!("Node {} added policy {}", self.peer_id, id);
        Ok(id)
    }

    async fn add_doc_actor_relationship(
        &self,
        ctx: &RequestContext,
        collection: &str,
        doc_id: &DocId,
        relation: &str,
        target_actor: &str,
    ) -> NodeResult<bool> {
        self.relationship_guard(ctx, collection, doc_id)?;
        self.db.lock().dac.add(doc_id, relation, target_actor)
    }

    async fn delete_doc_actor_relationship(
        &self,
        ctx: &RequestContext,
        collection: &str,
        doc_id: &DocId,
        relation: &str,
        target_actor: &str,
    ) -> NodeResult<bool> {
        self.relationship_guard(ctx, collection, doc_id)?;
        self.db.lock().dac.remove(doc_id, relation, target_actor)
    }

    async fn disable_aac(&self, ctx: &RequestContext) -> NodeResult<()> {
        self.ensure_open()?;
        let actor = self.actor(ctx)?;
        self.db.lock().aac.disable(actor.as_deref())?;
        info!("Node {} admin acp disabled", self.peer_id);
        Ok(())
    }

    async fn re_enable_aac(&self, ctx: &RequestContext) -> NodeResult<()> {
        self.ensure_open()?;
        let actor = self.actor(ctx)?;
        self.db.lock().aac.re_enable(actor.as_deref())?;
        info!("Node {} admin acp re-enabled", self.peer_id);
        Ok(())
    }

    async fn get_aac_status(&self, _ctx: &RequestContext) -> NodeResult<AacStatus> {
        self.ensure_open()?;
        Ok(self.db.lock().aac.status())
    }

    // ── P2P ──────────────────────────────────────────────────────

    async fn connect(&self, addr: &NodeAddr) -> NodeResult<()> {
        self.ensure_open()?;
        let target = self.target(addr)?;
        self.link(&target);
        debug!("Node {} connected to {}", self.peer_id, target.peer_id);
        Ok(())
    }

    async fn set_replicator(&self, addr: &NodeAddr) -> NodeResult<()> {
        self.ensure_open()?;
        let target = self.target(addr)?;
        self.link(&target);

        let blocks: Vec<Block> = {
            let mut db = self.db.lock();
            db.replicators.insert(target.peer_id);
            db.documents.values().flat_map(|r| r.ordered_blocks()).collect()
        };
        for block in blocks {
            let cid = block.cid()?;
            target.deliver(Inbound::Block {
                from: self.peer_id,
                cid,
                block,
            });
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        target.deliver(Inbound::Barrier(ack_tx));
        let events = self.events.clone();
        let peer = target.peer_id;
        tokio::spawn(async move {
            if ack_rx.await.is_ok() {
                events.publish(NodeEvent::ReplicatorCompleted(ReplicatorCompletedEvent { peer }));
            }
        });
        info!("Node {} replicating to {}", self.peer_id, peer);
        Ok(())
    }

    async fn delete_replicator(&self, addr: &NodeAddr) -> NodeResult<()> {
        self.ensure_open()?;
        if !self.db.lock().replicators.remove(&addr.peer_id) {
            return Err(NodeError::PeerNotFound(addr.peer_id.to_string()));
        }
        Ok(())
    }

    async fn get_all_replicators(&self) -> NodeResult<Vec<PeerId>> {
        self.ensure_open()?;
        Ok(self.db.lock().replicators.iter().copied().collect())
    }

    async fn add_p2p_collections(&self, names: &[String]) -> NodeResult<()> {
        self.ensure_open()?;
        let roots = self.resolve_roots(names)?;
        self.db.lock().p2p_collections.extend(roots);
        Ok(())
    }

    async fn remove_p2p_collections(&self, names: &[String]) -> NodeResult<()> {
        self.ensure_open()?;
        let roots = self.resolve_roots(names)?;
        let mut db = self.db.lock();
        for root in roots {
            db.p2p_collections.remove(&root);
        }
        Ok(())
    }

    async fn get_all_p2p_collections(&self) -> NodeResult<Vec<String>> {
        self.ensure_open()?;
        let db = self.db.lock();
        Ok(db
            .p2p_collections
            .iter()
            .filter_map(|root| db.collection_by_root(*root).map(|c| c.name.clone()))
            .collect())
    }

    async fn add_p2p_documents(&self, doc_ids: &[DocId]) -> NodeResult<()> {
        self.ensure_open()?;
        self.db.lock().p2p_documents.extend(doc_ids.iter().cloned());
        Ok(())
    }

    async fn remove_p2p_documents(&self, doc_ids: &[DocId]) -> NodeResult<()> {
        self.ensure_open()?;
        let mut db = self.db.lock();
        for doc_id in doc_ids {
            db.p2p_documents.remove(doc_id);
        }
        Ok(())
    }

    // ── Transactions & lifecycle ─────────────────────────────────

    async fn new_txn(&self) -> NodeResult<TxnId> {
        self.ensure_open()?;
        let id = TxnId(self.next_txn.fetch_add(1, Ordering::SeqCst));
        self.txns.lock().insert(id, TxnState::default());
        Ok(id)
    }

    async fn commit_txn(&self, txn: TxnId) -> NodeResult<()> {
        self.ensure_open()?;
        let state = self
            .txns
            .lock()
            .remove(&txn)
            .ok_or(NodeError::TxnNotFound(txn.0))?;
        {
            let mut db = self.db.lock();
            for (doc_id, head_at_start) in &state.touched {
                let current = db.materialize(doc_id).map(|d| d.head);
                if &current != head_at_start {
                    return Err(NodeError::TxnConflict);
                }
            }
            for migration in &state.migrations {
                db.migrations.retain(|m| {
                    m.collection_root != migration.collection_root
                        || m.source_version != migration.source_version
                });
                db.migrations.push(migration.clone());
            }
        }
        debug!("Node {} committed {}", self.peer_id, txn);
        self.apply_local(state.blocks);
        Ok(())
    }

    async fn discard_txn(&self, txn: TxnId) -> NodeResult<()> {
        self.txns
            .lock()
            .remove(&txn)
            .map(|_| ())
            .ok_or(NodeError::TxnNotFound(txn.0))
    }

    async fn close(&self) -> NodeResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(network) = self.network.upgrade() {
            network.remove(&self.peer_id);
        }
        self.inbox.lock().take();
        self.events.close();

        if self.options.database == DatabaseType::File {
            if let Some(dir) = &self.options.root_dir {
                let snapshot = serde_json::to_vec_pretty(&*self.db.lock())?;
                tokio::fs::write(dir.join(DATASTORE_FILE), snapshot).await?;
            }
        }
        info!("Closed node {}", self.peer_id);
        Ok(())
    }
}
