use crate::action::Stateful;
use crate::assert::{assert_error, assert_expected_error_raised, assert_results};
use crate::error::{HarnessError, HarnessResult};
use crate::identity::IdentityRef;
use crate::results::Expected;
use crate::state::State;
use crate::template;
use async_trait::async_trait;
use meshtest_node::{LensConfig, LensOp, RequestContext};
use tracing::debug;

/// Adds schema types to one node or to every open node.
///
/// The schema may reference generated values, e.g. `{{.Policy0}}`, which
/// are resolved per node.
#[derive(Debug, Clone, Default)]
pub struct SchemaUpdate {
    pub node: Option<usize>,
    pub schema: String,
    /// Needed when admin access control is enabled.
    pub identity: Option<IdentityRef>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for SchemaUpdate {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        for index in state.node_indices(self.node)? {
            let schema = template::replace(state, index, &self.schema)?;
            let ctx = state.request_context(self.identity, index, None).await?;
            let result = state.client(index)?.add_schema(&ctx, &schema).await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
            for description in result.unwrap_or_default() {
                if !state.collection_names.contains(&description.name) {
                    state.collection_names.push(description.name);
                }
            }
        }
        state.refresh_collections().await
    }
}

/// Applies a collection patch (a JSON array of operations).
#[derive(Debug, Clone, Default)]
pub struct PatchCollection {
    pub node: Option<usize>,
    pub patch: String,
    pub identity: Option<IdentityRef>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for PatchCollection {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        for index in state.node_indices(self.node)? {
            let ctx = state.request_context(self.identity, index, None).await?;
            let result = state.client(index)?.patch_collection(&ctx, &self.patch).await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
        }
        state.refresh_collections().await
    }
}

/// Checks the collection descriptions of a node.
#[derive(Debug, Clone, Default)]
pub struct GetCollections {
    pub node: Option<usize>,
    /// Expected descriptions, as a list of objects.
    pub expected: Option<Expected>,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for GetCollections {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        for index in state.node_indices(self.node)? {
            state.current_node_id = index;
            let result = state
                .client(index)?
                .get_collections(&RequestContext::new())
                .await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
            if let (Ok(collections), Some(expected)) = (result, &self.expected) {
                let actual = serde_json::to_value(collections)
                    .map_err(|e| HarnessError::InvalidAction(e.to_string()))?;
                assert_results(state, expected, &actual);
            }
        }
        Ok(())
    }
}

/// Registers a migration between two versions of a collection.
///
/// Versions are addressed by their position in the collection's history,
/// oldest first.
#[derive(Debug, Clone, Default)]
pub struct ConfigureMigration {
    pub node: Option<usize>,
    pub collection: usize,
    pub source_version: usize,
    pub destination_version: usize,
    pub ops: Vec<LensOp>,
    pub txn: Option<usize>,
    pub identity: Option<IdentityRef>,
    pub expected_error: Option<String>,
}

impl ConfigureMigration {
    fn config(&self, state: &State, node: usize) -> HarnessResult<LensConfig> {
        let description = state.collection(node, self.collection)?;
        let versions = description.versions();
        let version = |i: usize| {
            versions.get(i).map(|v| (*v).clone()).ok_or_else(|| {
                HarnessError::InvalidAction(format!(
                    "collection {} has no version {i}",
                    self.collection
                ))
            })
        };
        Ok(LensConfig {
            collection: description.name.clone(),
            source_version: version(self.source_version)?,
            destination_version: version(self.destination_version)?,
            ops: self.ops.clone(),
        })
    }
}

#[async_trait]
impl Stateful for ConfigureMigration {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        for index in state.node_indices(self.node)? {
            let config = self.config(state, index)?;
            let ctx = state.request_context(self.identity, index, self.txn).await?;
            let result = state.client(index)?.set_migration(&ctx, config).await;

            let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
            assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
            debug!("Configured migration of collection {} on node {}", self.collection, index);
        }
        Ok(())
    }
}
