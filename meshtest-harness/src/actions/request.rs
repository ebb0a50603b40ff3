use crate::action::Stateful;
use crate::assert::{assert_error, assert_expected_error_raised, assert_results};
use crate::error::HarnessResult;
use crate::identity::IdentityRef;
use crate::results::Expected;
use crate::state::State;
use crate::template;
use async_trait::async_trait;
use meshtest_node::NodeError;

/// Runs a read request and checks its results.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub node: Option<usize>,
    pub identity: Option<IdentityRef>,
    pub txn: Option<usize>,
    pub request: String,
    /// Expected `{collection: [documents]}` result, if checked.
    pub results: Option<Expected>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for Request {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        for index in state.node_indices(self.node)? {
            state.current_node_id = index;
            let request = template::replace(state, index, &self.request)?;
            let ctx = state.request_context(self.identity, index, self.txn).await?;
            let result = state.client(index)?.exec_request(&ctx, &request).await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
            if let (Ok(actual), Some(expected)) = (result, &self.results) {
                assert_results(state, expected, &actual);
            }
        }
        Ok(())
    }
}

/// Verifies that a document's head block was signed by `signer`.
#[derive(Debug, Clone)]
pub struct VerifyBlockSignature {
    pub node: Option<usize>,
    pub collection: usize,
    pub doc: usize,
    pub signer: IdentityRef,
    /// Identity reading the document head.
    pub identity: Option<IdentityRef>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for VerifyBlockSignature {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let doc_id = state.doc_id(self.collection, self.doc)?.clone();
        let public_key = state
            .get_identity_holder(self.signer)?
            .identity
            .public_key()
            .clone();
        for index in state.node_indices(self.node)? {
            let name = state.collection_name(index, self.collection)?;
            let ctx = state.request_context(self.identity, index, None).await?;
            let client = state.client(index)?;
            let result = match client.doc_head(&ctx, &name, &doc_id).await {
                Ok(Some(cid)) => client.verify_signature(&ctx, &cid, &public_key).await,
                Ok(None) => Err(NodeError::DocumentNotFound),
                Err(e) => Err(e),
            };

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
        }
        Ok(())
    }
}
