//! Error types for the harness.

use meshtest_identity::IdentityError;
use meshtest_node::NodeError;
use meshtest_types::{Cid, DocId, EventTopic};
use std::fmt;
use thiserror::Error;

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that abort a test case.
///
/// Expected-domain errors never show up here: they are matched against the
/// action's expected error and, on mismatch, recorded as soft failures in the
/// [`TestReport`](crate::TestReport).
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A template could not be parsed or referenced an unknown key.
    #[error("template error: {0}")]
    Template(String),

    /// An identity reference could not be resolved.
    #[error("identity error: {0}")]
    Identity(String),

    /// Key generation or token issuance failed.
    #[error(transparent)]
    Crypto(#[from] IdentityError),

    /// The action is malformed for the current state.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("unknown node: {0}")]
    UnknownNode(usize),

    #[error("unknown collection index: {0}")]
    UnknownCollection(usize),

    #[error("unknown document index: {collection}/{doc}")]
    UnknownDocument { collection: usize, doc: usize },

    #[error("unknown transaction index: {0}")]
    UnknownTxn(usize),

    /// A node call failed while no error was expected.
    #[error("unexpected error: {0}")]
    UnexpectedError(String),

    /// A setup step against a node failed.
    #[error("node error: {0}")]
    Node(#[from] NodeError),

    #[error("timed out waiting for {topic} event on node {node}")]
    EventTimeout { node: usize, topic: EventTopic },

    #[error("{topic} subscription of node {node} closed")]
    EventChannelClosed { node: usize, topic: EventTopic },

    /// A node reported an update for a document the action did not write.
    #[error("unexpected update of document {doc_id} on node {node}")]
    UnexpectedUpdate { node: usize, doc_id: DocId },

    /// Nodes did not converge before the sync deadline.
    #[error("timed out waiting for sync\n{0}")]
    SyncTimeout(SyncMismatchReport),

    /// Invalid harness configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps a failure with the action that caused it.
    #[error("action {index} ({name}): {source}")]
    Action {
        index: usize,
        name: &'static str,
        #[source]
        source: Box<HarnessError>,
    },
}

impl HarnessError {
    pub(crate) fn in_action(self, index: usize, name: &'static str) -> Self {
        HarnessError::Action {
            index,
            name,
            source: Box::new(self),
        }
    }
}

/// Per-node heads that had not converged when a sync wait timed out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncMismatchReport {
    pub nodes: Vec<NodeMismatch>,
}

/// Unconverged documents on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMismatch {
    pub node: usize,
    pub docs: Vec<DocMismatch>,
}

/// Expected versus observed head of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocMismatch {
    pub doc_id: DocId,
    pub expected: Cid,
    /// `None` if no merge of the document was observed.
    pub actual: Option<Cid>,
    pub decrypted: Option<bool>,
}

impl SyncMismatchReport {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl fmt::Display for SyncMismatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            writeln!(f, "node {}:", node.node)?;
            for doc in &node.docs {
                write!(f, "  {}: expected {}, ", doc.doc_id, doc.expected)?;
                match (&doc.actual, doc.decrypted) {
                    (Some(actual), Some(decrypted)) => {
                        writeln!(f, "actual {actual} (decrypted: {decrypted})")?
                    }
                    (Some(actual), None) => writeln!(f, "actual {actual}")?,
                    (None, _) => writeln!(f, "actual <none>")?,
                }
            }
        }
        Ok(())
    }
}
