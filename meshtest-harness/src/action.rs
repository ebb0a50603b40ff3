//! The action pipeline.
//!
//! A test case is a list of [`Action`]s run strictly in order. The set of
//! actions is closed: each variant wraps a concrete action type, and
//! [`Action::perform`] dispatches with an exhaustive match. Actions that
//! need the test state implement [`Stateful`]; the rest implement
//! [`Execute`] and never see it.

use crate::actions::*;
use crate::error::HarnessResult;
use crate::state::State;
use async_trait::async_trait;

/// An action that runs without access to the test state.
#[async_trait]
pub trait Execute {
    async fn execute(&self) -> HarnessResult<()>;
}

/// An action that reads or mutates the test state.
#[async_trait]
pub trait Stateful {
    async fn execute(&self, state: &mut State) -> HarnessResult<()>;
}

macro_rules! actions {
    ($($variant:ident),* $(,)?) => {
        /// One step of a test case.
        #[derive(Debug, Clone)]
        pub enum Action {
            $($variant($variant),)*
        }

        $(
            impl From<$variant> for Action {
                fn from(action: $variant) -> Self {
                    Action::$variant(action)
                }
            }
        )*

        impl Action {
            /// The action's type name, for logs and errors.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Action::$variant(_) => stringify!($variant),)*
                }
            }
        }
    };
}

actions! {
    StartNode,
    Close,
    Restart,
    ConnectPeers,
    ConfigureReplicator,
    DeleteReplicator,
    SubscribeToCollection,
    UnsubscribeToCollection,
    SubscribeToDocument,
    UnsubscribeToDocument,
    GetAllP2PCollections,
    SchemaUpdate,
    PatchCollection,
    GetCollections,
    ConfigureMigration,
    AddDocPolicy,
    AddDocActorRelationship,
    DeleteDocActorRelationship,
    DisableAAC,
    ReEnableAAC,
    GetAACStatus,
    CreateDoc,
    UpdateDoc,
    DeleteDoc,
    Request,
    VerifyBlockSignature,
    TransactionCommit,
    WaitForSync,
    SetupComplete,
    Sleep,
}

impl Action {
    /// Runs the action.
    pub async fn perform(&self, state: &mut State) -> HarnessResult<()> {
        match self {
            Action::SetupComplete(a) => a.execute().await,
            Action::Sleep(a) => a.execute().await,
            Action::StartNode(a) => Stateful::execute(a, state).await,
            Action::Close(a) => Stateful::execute(a, state).await,
            Action::Restart(a) => Stateful::execute(a, state).await,
            Action::ConnectPeers(a) => Stateful::execute(a, state).await,
            Action::ConfigureReplicator(a) => Stateful::execute(a, state).await,
            Action::DeleteReplicator(a) => Stateful::execute(a, state).await,
            Action::SubscribeToCollection(a) => Stateful::execute(a, state).await,
            Action::UnsubscribeToCollection(a) => Stateful::execute(a, state).await,
            Action::SubscribeToDocument(a) => Stateful::execute(a, state).await,
            Action::UnsubscribeToDocument(a) => Stateful::execute(a, state).await,
            Action::GetAllP2PCollections(a) => Stateful::execute(a, state).await,
            Action::SchemaUpdate(a) => Stateful::execute(a, state).await,
            Action::PatchCollection(a) => Stateful::execute(a, state).await,
            Action::GetCollections(a) => Stateful::execute(a, state).await,
            Action::ConfigureMigration(a) => Stateful::execute(a, state).await,
            Action::AddDocPolicy(a) => Stateful::execute(a, state).await,
            Action::AddDocActorRelationship(a) => Stateful::execute(a, state).await,
            Action::DeleteDocActorRelationship(a) => Stateful::execute(a, state).await,
            Action::DisableAAC(a) => Stateful::execute(a, state).await,
            Action::ReEnableAAC(a) => Stateful::execute(a, state).await,
            Action::GetAACStatus(a) => Stateful::execute(a, state).await,
            Action::CreateDoc(a) => Stateful::execute(a, state).await,
            Action::UpdateDoc(a) => Stateful::execute(a, state).await,
            Action::DeleteDoc(a) => Stateful::execute(a, state).await,
            Action::Request(a) => Stateful::execute(a, state).await,
            Action::VerifyBlockSignature(a) => Stateful::execute(a, state).await,
            Action::TransactionCommit(a) => Stateful::execute(a, state).await,
            Action::WaitForSync(a) => Stateful::execute(a, state).await,
        }
    }

    /// Whether the action makes nodes talk to each other.
    pub fn uses_network(&self) -> bool {
        matches!(
            self,
            Action::ConnectPeers(_)
                | Action::ConfigureReplicator(_)
                | Action::SubscribeToCollection(_)
                | Action::SubscribeToDocument(_)
        )
    }
}
