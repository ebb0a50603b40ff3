//! Client boundary and simulated nodes for meshtest.
//!
//! # Architecture
//!
//! The harness talks to nodes exclusively through the [`Client`] trait.
//! This crate ships one implementation, [`SimNode`], an in-process node
//! that is just real enough to exercise the harness:
//!
//! - **Schema**: collections declared in a small SDL, patched into new versions
//! - **Documents**: grow-only block sets folded in a deterministic order
//! - **Access control**: document policies with owner/reader/writer
//!   relations, and admin ACP gating the whole node
//! - **P2P**: connections, replicators and pubsub-style subscriptions over an
//!   in-process [`SimNetwork`]
//! - **Events**: `Update`, `MergeComplete` and `ReplicatorCompleted` on a
//!   per-node [`EventBus`]
//! - **Transactions** and **lens migrations**
//!
//! The [`process`] module covers nodes run as child processes: port leasing
//! and line-by-line output capture. It stands on its own. No client type
//! routes through it yet; a command-line [`Client`] would spawn its node with
//! [`process::NodeProcess`] and lease ports from [`process::PortAllocator`].

pub mod acp;
pub mod block;
mod client;
mod config;
mod db;
mod error;
mod events;
pub mod lens;
mod lexer;
mod network;
mod node;
pub mod process;
pub mod request;
pub mod schema;

pub use acp::AacStatus;
pub use client::{Client, NodeFactory, RequestContext, TxnId};
pub use config::{DatabaseType, KmsType, NodeOptions};
pub use error::{NodeError, NodeResult};
pub use events::{EventBus, Subscription};
pub use lens::{LensConfig, LensOp};
pub use network::{SimNetwork, DATASTORE_FILE};
pub use node::SimNode;
pub use schema::{CollectionDescription, CollectionPatch, FieldDefinition, FieldKind, PolicyBinding};
