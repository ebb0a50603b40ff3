use crate::action::Stateful;
use crate::assert::{assert_error, assert_expected_error_raised};
use crate::error::HarnessResult;
use crate::identity::IdentityRef;
use crate::state::State;
use crate::sync::wait_for_update_events;
use async_trait::async_trait;
use meshtest_types::DocId;
use serde_json::Value;
use tracing::debug;

/// Records a successful write: in the transaction if there is one,
/// otherwise by waiting for the node's update event.
async fn after_write(
    state: &mut State,
    node: usize,
    txn: Option<usize>,
    doc_id: DocId,
) -> HarnessResult<()> {
    match txn {
        Some(index) => {
            state.record_txn_write(index, doc_id);
            Ok(())
        }
        None => wait_for_update_events(state, node, &[doc_id]).await,
    }
}

/// Creates a document on one node, or on every open node.
///
/// Document IDs are content derived, so creating the same document on
/// several nodes yields one ID, recorded once under the next index of the
/// collection.
#[derive(Debug, Clone, Default)]
pub struct CreateDoc {
    pub node: Option<usize>,
    pub collection: usize,
    pub doc: Value,
    pub identity: Option<IdentityRef>,
    pub txn: Option<usize>,
    pub encrypted: bool,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for CreateDoc {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let mut recorded = false;
        for index in state.node_indices(self.node)? {
            let name = state.collection_name(index, self.collection)?;
            let ctx = state.request_context(self.identity, index, self.txn).await?;
            let result = state
                .client(index)?
                .create_docs(&ctx, &name, vec![self.doc.clone()], self.encrypted)
                .await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
            let Ok(doc_ids) = result else {
                continue;
            };
            for doc_id in doc_ids {
                if !recorded {
                    debug!("Created document {} in collection {}", doc_id, self.collection);
                    state.push_doc_id(self.collection, doc_id.clone());
                    recorded = true;
                }
                after_write(state, index, self.txn, doc_id).await?;
            }
        }
        Ok(())
    }
}

/// Applies a JSON merge patch to a document.
#[derive(Debug, Clone, Default)]
pub struct UpdateDoc {
    pub node: Option<usize>,
    pub collection: usize,
    pub doc: usize,
    pub patch: Value,
    pub identity: Option<IdentityRef>,
    pub txn: Option<usize>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for UpdateDoc {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let doc_id = state.doc_id(self.collection, self.doc)?.clone();
        for index in state.node_indices(self.node)? {
            let name = state.collection_name(index, self.collection)?;
            let ctx = state.request_context(self.identity, index, self.txn).await?;
            let result = state
                .client(index)?
                .update_doc(&ctx, &name, &doc_id, self.patch.clone())
                .await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
            if result.is_ok() {
                after_write(state, index, self.txn, doc_id.clone()).await?;
            }
        }
        Ok(())
    }
}

/// Deletes a document.
#[derive(Debug, Clone, Default)]
pub struct DeleteDoc {
    pub node: Option<usize>,
    pub collection: usize,
    pub doc: usize,
    pub identity: Option<IdentityRef>,
    pub txn: Option<usize>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for DeleteDoc {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let doc_id = state.doc_id(self.collection, self.doc)?.clone();
        for index in state.node_indices(self.node)? {
            let name = state.collection_name(index, self.collection)?;
            let ctx = state.request_context(self.identity, index, self.txn).await?;
            let result = state.client(index)?.delete_doc(&ctx, &name, &doc_id).await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
            if result.is_ok() {
                after_write(state, index, self.txn, doc_id.clone()).await?;
            }
        }
        Ok(())
    }
}
