use crate::action::Stateful;
use crate::assert::{assert_equal, assert_error, assert_expected_error_raised};
use crate::error::HarnessResult;
use crate::state::{ColDocIndex, State};
use crate::sync::{wait_for_replicator_event, wait_for_sync};
use async_trait::async_trait;
use tracing::debug;

/// Collection index that names no collection on any node.
pub const NON_EXISTENT_COLLECTION: usize = usize::MAX;

/// Name sent to nodes for [`NON_EXISTENT_COLLECTION`].
const NON_EXISTENT_COLLECTION_NAME: &str = "NonExistentCollection";

/// Connects two nodes.
#[derive(Debug, Clone, Default)]
pub struct ConnectPeers {
    pub source: usize,
    pub target: usize,
}

#[async_trait]
impl Stateful for ConnectPeers {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let client = state.client(self.source)?;
        let addr = state.node(self.target)?.addr.clone();
        client.connect(&addr).await?;

        state.node_mut(self.source)?.p2p.connections.insert(self.target);
        state.node_mut(self.target)?.p2p.connections.insert(self.source);
        debug!("Connected node {} to node {}", self.source, self.target);
        Ok(())
    }
}

/// Makes `source` replicate every document to `target`.
#[derive(Debug, Clone, Default)]
pub struct ConfigureReplicator {
    pub source: usize,
    pub target: usize,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for ConfigureReplicator {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let client = state.client(self.source)?;
        let addr = state.node(self.target)?.addr.clone();
        let result = client.set_replicator(&addr).await;

        let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
        assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
        if result.is_ok() {
            wait_for_replicator_event(state, self.source, self.target).await?;
        }
        Ok(())
    }
}

/// Stops `source` replicating to `target`.
#[derive(Debug, Clone, Default)]
pub struct DeleteReplicator {
    pub source: usize,
    pub target: usize,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for DeleteReplicator {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let client = state.client(self.source)?;
        let addr = state.node(self.target)?.addr.clone();
        let result = client.delete_replicator(&addr).await;

        let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
        assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
        if result.is_ok() {
            state.node_mut(self.source)?.p2p.replicators.remove(&self.target);
        }
        Ok(())
    }
}

fn collection_names(state: &State, node: usize, collections: &[usize]) -> HarnessResult<Vec<String>> {
    collections
        .iter()
        .map(|&col| {
            if col == NON_EXISTENT_COLLECTION {
                Ok(NON_EXISTENT_COLLECTION_NAME.to_string())
            } else {
                state.collection_name(node, col)
            }
        })
        .collect()
}

/// Subscribes a node to documents of the given collections created on
/// connected peers.
#[derive(Debug, Clone, Default)]
pub struct SubscribeToCollection {
    pub node: usize,
    /// Collection indexes; may include [`NON_EXISTENT_COLLECTION`].
    pub collections: Vec<usize>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for SubscribeToCollection {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let names = collection_names(state, self.node, &self.collections)?;
        let result = state.client(self.node)?.add_p2p_collections(&names).await;

        let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
        assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
        if result.is_ok() {
            let p2p = &mut state.node_mut(self.node)?.p2p;
            p2p.peer_collections.extend(
                self.collections
                    .iter()
                    .filter(|&&col| col != NON_EXISTENT_COLLECTION),
            );
            wait_for_sync(state, false).await?;
        }
        Ok(())
    }
}

/// Removes collection subscriptions.
#[derive(Debug, Clone, Default)]
pub struct UnsubscribeToCollection {
    pub node: usize,
    pub collections: Vec<usize>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for UnsubscribeToCollection {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let names = collection_names(state, self.node, &self.collections)?;
        let result = state.client(self.node)?.remove_p2p_collections(&names).await;

        let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
        assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
        if result.is_ok() {
            let p2p = &mut state.node_mut(self.node)?.p2p;
            for col in &self.collections {
                p2p.peer_collections.remove(col);
            }
            wait_for_sync(state, false).await?;
        }
        Ok(())
    }
}

/// Subscribes a node to individual documents.
#[derive(Debug, Clone, Default)]
pub struct SubscribeToDocument {
    pub node: usize,
    pub docs: Vec<ColDocIndex>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for SubscribeToDocument {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let doc_ids = self
            .docs
            .iter()
            .map(|i| state.doc_id(i.col, i.doc).cloned())
            .collect::<HarnessResult<Vec<_>>>()?;
        let result = state.client(self.node)?.add_p2p_documents(&doc_ids).await;

        let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
        assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
        if result.is_ok() {
            state
                .node_mut(self.node)?
                .p2p
                .peer_documents
                .extend(self.docs.iter().copied());
            wait_for_sync(state, false).await?;
        }
        Ok(())
    }
}

/// Removes document subscriptions.
#[derive(Debug, Clone, Default)]
pub struct UnsubscribeToDocument {
    pub node: usize,
    pub docs: Vec<ColDocIndex>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for UnsubscribeToDocument {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let doc_ids = self
            .docs
            .iter()
            .map(|i| state.doc_id(i.col, i.doc).cloned())
            .collect::<HarnessResult<Vec<_>>>()?;
        let result = state.client(self.node)?.remove_p2p_documents(&doc_ids).await;

        let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
        assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
        if result.is_ok() {
            let p2p = &mut state.node_mut(self.node)?.p2p;
            for doc in &self.docs {
                p2p.peer_documents.remove(doc);
            }
            wait_for_sync(state, false).await?;
        }
        Ok(())
    }
}

/// Checks the collections a node subscribes to.
#[derive(Debug, Clone, Default)]
pub struct GetAllP2PCollections {
    pub node: usize,
    /// Expected collection indexes.
    pub expected: Vec<usize>,
}

#[async_trait]
impl Stateful for GetAllP2PCollections {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let mut expected = collection_names(state, self.node, &self.expected)?;
        let mut actual = state.client(self.node)?.get_all_p2p_collections().await?;
        expected.sort();
        actual.sort();
        assert_equal(state, "p2p collections", &expected, &actual);
        Ok(())
    }
}

/// Waits until every node has merged the document heads it should hold.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitForSync {
    /// Also require that the heads were decrypted.
    pub decrypted: bool,
}

#[async_trait]
impl Stateful for WaitForSync {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        wait_for_sync(state, self.decrypted).await
    }
}
