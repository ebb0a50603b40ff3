//! Document and admin access control actions.

use crate::action::Stateful;
use crate::assert::{assert_equal, assert_error, assert_expected_error_raised};
use crate::error::HarnessResult;
use crate::identity::IdentityRef;
use crate::state::State;
use crate::template;
use async_trait::async_trait;
use meshtest_node::AacStatus;
use tracing::debug;

/// Adds a document access policy on one node or every open node.
///
/// The resulting ID is recorded per node so later schemas can reference it
/// as `{{.PolicyN}}`.
#[derive(Debug, Clone, Default)]
pub struct AddDocPolicy {
    pub node: Option<usize>,
    pub identity: Option<IdentityRef>,
    pub policy: String,
    pub expected_policy_id: Option<String>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for AddDocPolicy {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        for index in state.node_indices(self.node)? {
            let policy = template::replace(state, index, &self.policy)?;
            let ctx = state.request_context(self.identity, index, None).await?;
            let result = state.client(index)?.add_dac_policy(&ctx, &policy).await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
            let Ok(policy_id) = result else {
                continue;
            };
            if let Some(expected) = &self.expected_policy_id {
                assert_equal(state, "policy id", expected, &policy_id);
            }
            debug!("Added policy {} on node {}", policy_id, index);
            if state.policy_ids.len() <= index {
                state.policy_ids.resize_with(index + 1, Vec::new);
            }
            state.policy_ids[index].push(policy_id);
        }
        Ok(())
    }
}

/// Grants `target` a relation on a document.
#[derive(Debug, Clone)]
pub struct AddDocActorRelationship {
    pub node: Option<usize>,
    pub collection: usize,
    pub doc: usize,
    pub relation: String,
    /// Must own the document.
    pub requestor: Option<IdentityRef>,
    /// A single identity, or every actor via the broadcast selector.
    pub target: IdentityRef,
    /// Whether the relationship is expected to exist already.
    pub expected_existence: bool,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for AddDocActorRelationship {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let doc_id = state.doc_id(self.collection, self.doc)?.clone();
        let target = state.identity_did(self.target)?;
        for index in state.node_indices(self.node)? {
            let name = state.collection_name(index, self.collection)?;
            let ctx = state.request_context(self.requestor, index, None).await?;
            let result = state
                .client(index)?
                .add_doc_actor_relationship(&ctx, &name, &doc_id, &self.relation, &target)
                .await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
            if let Ok(existed) = result {
                assert_equal(state, "relationship existed", &self.expected_existence, &existed);
            }
        }
        Ok(())
    }
}

/// Revokes a relation on a document.
#[derive(Debug, Clone)]
pub struct DeleteDocActorRelationship {
    pub node: Option<usize>,
    pub collection: usize,
    pub doc: usize,
    pub relation: String,
    pub requestor: Option<IdentityRef>,
    pub target: IdentityRef,
    /// Whether a relationship is expected to be found and deleted.
    pub expected_record_found: bool,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for DeleteDocActorRelationship {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let doc_id = state.doc_id(self.collection, self.doc)?.clone();
        let target = state.identity_did(self.target)?;
        for index in state.node_indices(self.node)? {
            let name = state.collection_name(index, self.collection)?;
            let ctx = state.request_context(self.requestor, index, None).await?;
            let result = state
                .client(index)?
                .delete_doc_actor_relationship(&ctx, &name, &doc_id, &self.relation, &target)
                .await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
            if let Ok(found) = result {
                assert_equal(state, "relationship found", &self.expected_record_found, &found);
            }
        }
        Ok(())
    }
}

/// Temporarily disables admin access control.
#[derive(Debug, Clone, Default)]
pub struct DisableAAC {
    pub node: Option<usize>,
    pub identity: Option<IdentityRef>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for DisableAAC {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        for index in state.node_indices(self.node)? {
            let ctx = state.request_context(self.identity, index, None).await?;
            let result = state.client(index)?.disable_aac(&ctx).await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
        }
        Ok(())
    }
}

/// Re-enables admin access control after it was disabled.
#[derive(Debug, Clone, Default)]
pub struct ReEnableAAC {
    pub node: Option<usize>,
    pub identity: Option<IdentityRef>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for ReEnableAAC {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        for index in state.node_indices(self.node)? {
            let ctx = state.request_context(self.identity, index, None).await?;
            let result = state.client(index)?.re_enable_aac(&ctx).await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
        }
        Ok(())
    }
}

/// Checks the admin access control status.
#[derive(Debug, Clone, Default)]
pub struct GetAACStatus {
    pub node: Option<usize>,
    pub identity: Option<IdentityRef>,
    pub expected_status: AacStatus,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for GetAACStatus {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        for index in state.node_indices(self.node)? {
            let ctx = state.request_context(self.identity, index, None).await?;
            let result = state.client(index)?.get_aac_status(&ctx).await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
            if let Ok(status) = result {
                assert_equal(state, "aac status", &self.expected_status, &status);
            }
        }
        Ok(())
    }
}
