//! Core type definitions for the meshtest harness.
//!
//! This crate defines the small value types shared by the simulated nodes
//! and the harness that drives them:
//! - Document, block and collection identifiers
//! - Peer identifiers and addresses
//! - The three node event topics and their payloads
//!
//! Everything here is plain data. Nothing in this crate performs I/O.

mod event;
mod ids;

pub use event::{
    EventTopic, MergeCompleteEvent, NodeEvent, ReplicatorCompletedEvent, UpdateEvent,
};
pub use ids::{Cid, CollectionRootId, CollectionVersionId, DocId, NodeAddr, PeerId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid document ID: {0}")]
    InvalidDocId(String),

    #[error("invalid CID: {0}")]
    InvalidCid(String),

    #[error("unknown event topic: {0}")]
    UnknownTopic(String),
}
