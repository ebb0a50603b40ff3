//! Node event types.
//!
//! Every simulated node publishes on three topics. The harness subscribes to
//! all three when a node starts and uses them to decide when asynchronous
//! replication has settled.

use crate::{Cid, CollectionRootId, DocId, Error, PeerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The topics a node publishes events on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// A block received from a peer was merged into the local store.
    MergeComplete,
    /// A local write produced a new document head.
    Update,
    /// A newly configured replicator finished its initial push.
    ReplicatorCompleted,
}

impl EventTopic {
    /// All topics, in subscription order.
    pub const ALL: [EventTopic; 3] = [
        EventTopic::MergeComplete,
        EventTopic::Update,
        EventTopic::ReplicatorCompleted,
    ];

    /// Wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::MergeComplete => "merge-complete",
            EventTopic::Update => "update",
            EventTopic::ReplicatorCompleted => "replicator-completed",
        }
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventTopic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventTopic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownTopic(s.to_string()))
    }
}

/// Payload of an [`EventTopic::Update`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub doc_id: DocId,
    pub collection_root: CollectionRootId,
    /// The block this write produced, which peers will merge.
    pub cid: Cid,
    /// True when this write created the document.
    pub is_create: bool,
}

/// Payload of an [`EventTopic::MergeComplete`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCompleteEvent {
    pub doc_id: DocId,
    pub collection_root: CollectionRootId,
    /// The merged block. Under concurrent writes this need not be the head.
    pub cid: Cid,
    /// The peer the merged block came from.
    pub by_peer: PeerId,
    /// Whether the receiving node could decrypt the document.
    pub decrypted: bool,
}

/// Payload of an [`EventTopic::ReplicatorCompleted`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatorCompletedEvent {
    /// The replicator target.
    pub peer: PeerId,
}

/// An event published by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "data")]
pub enum NodeEvent {
    MergeComplete(MergeCompleteEvent),
    Update(UpdateEvent),
    ReplicatorCompleted(ReplicatorCompletedEvent),
}

impl NodeEvent {
    /// The topic this event is published on.
    pub fn topic(&self) -> EventTopic {
        match self {
            NodeEvent::MergeComplete(_) => EventTopic::MergeComplete,
            NodeEvent::Update(_) => EventTopic::Update,
            NodeEvent::ReplicatorCompleted(_) => EventTopic::ReplicatorCompleted,
        }
    }

    /// The document this event concerns, if any.
    pub fn doc_id(&self) -> Option<&DocId> {
        match self {
            NodeEvent::MergeComplete(e) => Some(&e.doc_id),
            NodeEvent::Update(e) => Some(&e.doc_id),
            NodeEvent::ReplicatorCompleted(_) => None,
        }
    }
}
