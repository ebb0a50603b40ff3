//! Test state.
//!
//! A [`State`] is created for every run of a test case and threaded through
//! the action pipeline by `&mut` reference. Nodes, transactions, collections
//! and documents are all addressed by index, in the order the case created
//! them, so scenario authors never handle generated IDs directly.

use crate::assert::TestReport;
use crate::config::{ClientType, HarnessConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::identity::{IdentityHolder, IdentityRef};
use crate::matchers::StatefulMatcher;
use meshtest_identity::KeyType;
use meshtest_node::{
    Client, CollectionDescription, DatabaseType, EventBus, KmsType, NodeFactory, NodeOptions,
    NodeResult, RequestContext, Subscription, TxnId,
};
use meshtest_types::{Cid, CollectionRootId, DocId, EventTopic, NodeAddr, PeerId};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Index of a document within a collection, as created by the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColDocIndex {
    pub col: usize,
    pub doc: usize,
}

impl ColDocIndex {
    pub fn new(col: usize, doc: usize) -> Self {
        Self { col, doc }
    }
}

/// A document head observed on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocHeadState {
    pub cid: Cid,
    /// Whether the node could decrypt the document at this head.
    pub decrypted: bool,
}

/// What the harness knows about one node's place in the network.
#[derive(Debug, Clone, Default)]
pub struct P2PState {
    /// Nodes this node is connected to.
    pub connections: BTreeSet<usize>,
    /// Replicator targets of this node.
    pub replicators: BTreeSet<usize>,
    /// Collections (by index) this node subscribes to.
    pub peer_collections: BTreeSet<usize>,
    /// Documents this node subscribes to.
    pub peer_documents: BTreeSet<ColDocIndex>,
    /// Heads confirmed by events from this node.
    pub actual_heads: HashMap<DocId, DocHeadState>,
    /// Heads this node must reach once sync completes.
    pub expected_heads: HashMap<DocId, Cid>,
}

/// The three event subscriptions opened when a node starts.
#[derive(Debug)]
pub struct EventState {
    pub merge: Subscription,
    pub update: Subscription,
    pub replicator: Subscription,
}

impl EventState {
    pub fn new(bus: &EventBus) -> NodeResult<Self> {
        Ok(Self {
            merge: bus.subscribe(EventTopic::MergeComplete)?,
            update: bus.subscribe(EventTopic::Update)?,
            replicator: bus.subscribe(EventTopic::ReplicatorCompleted)?,
        })
    }
}

/// One node of the test.
pub struct NodeState {
    pub client: Arc<dyn Client>,
    pub event: EventState,
    pub p2p: P2PState,
    /// Options the node was started with; reused on restart.
    pub options: NodeOptions,
    /// Collections by index, aligned with [`State::collection_names`].
    pub collections: Vec<Option<CollectionDescription>>,
    pub closed: bool,
    pub addr: NodeAddr,
}

impl NodeState {
    pub(crate) fn new(client: Arc<dyn Client>, options: NodeOptions) -> NodeResult<Self> {
        let event = EventState::new(client.events())?;
        let addr = client.peer_info();
        Ok(Self {
            client,
            event,
            p2p: P2PState::default(),
            options,
            collections: Vec::new(),
            closed: false,
            addr,
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.addr.peer_id
    }
}

/// An explicit transaction opened by the case.
#[derive(Debug, Clone)]
pub struct TxnState {
    pub node: usize,
    pub handle: TxnId,
    /// Documents written in the transaction, once per write.
    pub pending: Vec<DocId>,
}

/// Selector values of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSelectors {
    pub database: DatabaseType,
    pub kms: KmsType,
    pub client: ClientType,
}

/// All state of one test case run.
pub struct State {
    pub config: HarnessConfig,
    pub selectors: RunSelectors,
    /// Soft assertion failures recorded so far.
    pub report: TestReport,
    pub(crate) identities: HashMap<IdentityRef, IdentityHolder>,
    /// Key type overrides; identities not listed use secp256k1.
    pub identity_types: HashMap<IdentityRef, KeyType>,
    pub(crate) next_identity_gen_seed: u64,
    pub(crate) txns: Vec<Option<TxnState>>,
    /// Policy IDs by node, in the order they were added.
    pub policy_ids: Vec<Vec<String>>,
    /// Collection names in the order the case declares them.
    pub collection_names: Vec<String>,
    pub(crate) collection_indexes_by_root: HashMap<CollectionRootId, usize>,
    /// Document IDs by collection index, in creation order.
    pub doc_ids: Vec<Vec<DocId>>,
    pub nodes: Vec<NodeState>,
    pub(crate) stateful_matchers: Vec<Arc<dyn StatefulMatcher>>,
    /// Node whose results are currently being asserted.
    pub current_node_id: usize,
    /// Index of the action being executed.
    pub current_action: usize,
    /// Whether the case uses the network at all.
    pub is_network_enabled: bool,
    pub(crate) factory: Arc<dyn NodeFactory>,
    data_dir: Option<tempfile::TempDir>,
}

impl State {
    pub fn new(
        config: HarnessConfig,
        selectors: RunSelectors,
        factory: Arc<dyn NodeFactory>,
        collection_names: Vec<String>,
    ) -> Self {
        Self {
            config,
            selectors,
            report: TestReport::default(),
            identities: HashMap::new(),
            identity_types: HashMap::new(),
            next_identity_gen_seed: 0,
            txns: Vec::new(),
            policy_ids: Vec::new(),
            collection_names,
            collection_indexes_by_root: HashMap::new(),
            doc_ids: Vec::new(),
            nodes: Vec::new(),
            stateful_matchers: Vec::new(),
            current_node_id: 0,
            current_action: 0,
            is_network_enabled: false,
            factory,
            data_dir: None,
        }
    }

    // ── Nodes ────────────────────────────────────────────────────

    pub fn node(&self, index: usize) -> HarnessResult<&NodeState> {
        self.nodes.get(index).ok_or(HarnessError::UnknownNode(index))
    }

    pub fn node_mut(&mut self, index: usize) -> HarnessResult<&mut NodeState> {
        self.nodes.get_mut(index).ok_or(HarnessError::UnknownNode(index))
    }

    /// The client of a node. Cloned out so callers can await on it while
    /// mutating the state.
    pub fn client(&self, index: usize) -> HarnessResult<Arc<dyn Client>> {
        Ok(self.node(index)?.client.clone())
    }

    /// Nodes an action targets: the given node, or every open node.
    pub fn node_indices(&self, node: Option<usize>) -> HarnessResult<Vec<usize>> {
        match node {
            Some(index) => {
                self.node(index)?;
                Ok(vec![index])
            }
            None => Ok(self
                .nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| !n.closed)
                .map(|(i, _)| i)
                .collect()),
        }
    }

    /// Root directory for a file-backed node, created on first use.
    pub(crate) fn node_root_dir(&mut self, index: usize) -> HarnessResult<PathBuf> {
        if self.data_dir.is_none() {
            self.data_dir = Some(tempfile::Builder::new().prefix("meshtest-").tempdir()?);
        }
        let base = self
            .data_dir
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .unwrap_or_default();
        Ok(base.join(format!("node-{index}")))
    }

    // ── Collections & documents ──────────────────────────────────

    /// The name to use for a collection index on a node: its current name
    /// there, or its declared name if the node does not have it.
    pub fn collection_name(&self, node: usize, col: usize) -> HarnessResult<String> {
        if let Some(Some(description)) = self.node(node)?.collections.get(col) {
            return Ok(description.name.clone());
        }
        self.collection_names
            .get(col)
            .cloned()
            .ok_or(HarnessError::UnknownCollection(col))
    }

    pub fn collection(&self, node: usize, col: usize) -> HarnessResult<&CollectionDescription> {
        self.node(node)?
            .collections
            .get(col)
            .and_then(Option::as_ref)
            .ok_or(HarnessError::UnknownCollection(col))
    }

    pub fn doc_id(&self, col: usize, doc: usize) -> HarnessResult<&DocId> {
        self.doc_ids
            .get(col)
            .and_then(|docs| docs.get(doc))
            .ok_or(HarnessError::UnknownDocument {
                collection: col,
                doc,
            })
    }

    pub(crate) fn push_doc_id(&mut self, col: usize, doc_id: DocId) {
        if self.doc_ids.len() <= col {
            self.doc_ids.resize_with(col + 1, Vec::new);
        }
        self.doc_ids[col].push(doc_id);
    }

    /// Index of a known document.
    pub fn doc_index(&self, doc_id: &DocId) -> Option<ColDocIndex> {
        self.doc_ids.iter().enumerate().find_map(|(col, docs)| {
            docs.iter()
                .position(|d| d == doc_id)
                .map(|doc| ColDocIndex::new(col, doc))
        })
    }

    pub fn collection_index_by_root(&self, root: CollectionRootId) -> Option<usize> {
        self.collection_indexes_by_root.get(&root).copied()
    }

    /// Re-reads every open node's collections, keeping indexes stable across
    /// renames by mapping collection roots to the index they first had.
    pub async fn refresh_collections(&mut self) -> HarnessResult<()> {
        for index in 0..self.nodes.len() {
            if self.nodes[index].closed {
                continue;
            }
            let client = self.client(index)?;
            let collections = client.get_collections(&RequestContext::new()).await?;

            for (col, name) in self.collection_names.iter().enumerate() {
                if let Some(found) = collections.iter().find(|c| &c.name == name) {
                    self.collection_indexes_by_root.entry(found.root_id).or_insert(col);
                }
            }

            let mut mapped = vec![None; self.collection_names.len()];
            for description in collections {
                if let Some(&col) = self.collection_indexes_by_root.get(&description.root_id) {
                    mapped[col] = Some(description);
                }
            }
            self.nodes[index].collections = mapped;
        }
        debug!("Refreshed collections of {} node(s)", self.nodes.len());
        Ok(())
    }

    // ── Transactions ─────────────────────────────────────────────

    /// The handle of transaction `index`, opening it on `node` on first use.
    pub(crate) async fn txn_handle(&mut self, index: usize, node: usize) -> HarnessResult<TxnId> {
        if let Some(Some(txn)) = self.txns.get(index) {
            if txn.node != node {
                return Err(HarnessError::InvalidAction(format!(
                    "transaction {index} belongs to node {}, not node {node}",
                    txn.node
                )));
            }
            return Ok(txn.handle);
        }
        let handle = self.client(node)?.new_txn().await?;
        if self.txns.len() <= index {
            self.txns.resize_with(index + 1, || None);
        }
        self.txns[index] = Some(TxnState {
            node,
            handle,
            pending: Vec::new(),
        });
        debug!("Opened transaction {} on node {}", index, node);
        Ok(handle)
    }

    pub(crate) fn record_txn_write(&mut self, index: usize, doc_id: DocId) {
        if let Some(Some(txn)) = self.txns.get_mut(index) {
            txn.pending.push(doc_id);
        }
    }

    pub(crate) fn take_txn(&mut self, index: usize) -> HarnessResult<TxnState> {
        self.txns
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(HarnessError::UnknownTxn(index))
    }

    /// A request context for `node` carrying the identity's token and the
    /// handle of transaction `txn`.
    pub async fn request_context(
        &mut self,
        identity: Option<IdentityRef>,
        node: usize,
        txn: Option<usize>,
    ) -> HarnessResult<RequestContext> {
        let token = self.identity_for_request(identity, node)?;
        let txn = match txn {
            Some(index) => Some(self.txn_handle(index, node).await?),
            None => None,
        };
        Ok(RequestContext::new().with_token(token).with_txn(txn))
    }

    // ── Matchers ─────────────────────────────────────────────────

    pub(crate) fn register_matcher(&mut self, matcher: &Arc<dyn StatefulMatcher>) {
        if !self.stateful_matchers.iter().any(|m| Arc::ptr_eq(m, matcher)) {
            self.stateful_matchers.push(matcher.clone());
        }
    }

    /// Resets every stateful matcher used by this run.
    pub fn reset_matchers(&mut self) {
        for matcher in self.stateful_matchers.drain(..) {
            matcher.reset_matcher_state();
        }
    }
}
