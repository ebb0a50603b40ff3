use crate::action::Stateful;
use crate::assert::{assert_error, assert_expected_error_raised};
use crate::error::HarnessResult;
use crate::state::State;
use crate::sync::wait_for_update_events;
use async_trait::async_trait;
use tracing::debug;

/// Commits transaction `txn`.
///
/// Writes made in the transaction publish their update events on commit;
/// they are awaited here.
#[derive(Debug, Clone, Default)]
pub struct TransactionCommit {
    pub txn: usize,
    pub expected_error: Option<String>,
}

#[async_trait]
impl Stateful for TransactionCommit {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        let txn = state.take_txn(self.txn)?;
        let result = state.client(txn.node)?.commit_txn(txn.handle).await;

        let raised = assert_error(state, result.as_ref().err(), self.expected_error.as_deref())?;
        assert_expected_error_raised(state, self.expected_error.as_deref(), raised);
        if result.is_ok() {
            debug!("Committed transaction {} on node {}", self.txn, txn.node);
            wait_for_update_events(state, txn.node, &txn.pending).await?;
        }
        Ok(())
    }
}
