//! Built-in actions.

mod acp;
mod doc;
mod misc;
mod node;
mod p2p;
mod request;
mod schema;
mod txn;

pub use acp::{
    AddDocActorRelationship, AddDocPolicy, DeleteDocActorRelationship, DisableAAC, GetAACStatus,
    ReEnableAAC,
};
pub use doc::{CreateDoc, DeleteDoc, UpdateDoc};
pub use misc::{SetupComplete, Sleep};
pub use node::{close_nodes, start_node, Close, Restart, StartNode};
pub use p2p::{
    ConfigureReplicator, ConnectPeers, DeleteReplicator, GetAllP2PCollections,
    SubscribeToCollection, SubscribeToDocument, UnsubscribeToCollection, UnsubscribeToDocument,
    WaitForSync, NON_EXISTENT_COLLECTION,
};
pub use request::{Request, VerifyBlockSignature};
pub use schema::{ConfigureMigration, GetCollections, PatchCollection, SchemaUpdate};
pub use txn::TransactionCommit;
