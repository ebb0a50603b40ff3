//! Error types for the node layer.

use meshtest_identity::IdentityError;
use thiserror::Error;

/// Result type for client operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// Errors returned by a node.
///
/// Display strings are what scenario authors match expected errors against,
/// so they are part of the node's observable behavior.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The node has been closed.
    #[error("node is closed")]
    Closed,

    /// The node's event bus has been closed.
    #[error("event bus is closed")]
    EventBusClosed,

    /// Admin access control rejected the caller.
    #[error("not authorized to perform operation")]
    NotAuthorized,

    /// Admin access control was never enabled on this node.
    #[error("admin acp is not configured")]
    AacNotConfigured,

    #[error("admin acp is already enabled")]
    AacAlreadyEnabled,

    #[error("admin acp is already disabled")]
    AacAlreadyDisabled,

    /// The schema definition could not be parsed.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("collection version not found: {0}")]
    VersionNotFound(String),

    /// A field referenced by a write or patch does not exist.
    #[error("the given field does not exist: {0}")]
    FieldNotFound(String),

    #[error("field already exists: {0}")]
    FieldExists(String),

    /// A field value does not match the field's kind.
    #[error("invalid value for field {field}: expected {expected}")]
    InvalidFieldValue { field: String, expected: String },

    #[error("a document with the given ID already exists: {0}")]
    DocumentExists(String),

    /// The document is missing or the caller may not see it.
    #[error("document not found or not authorized to access")]
    DocumentNotFound,

    /// The request could not be parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    #[error("resource not found in policy: {0}")]
    ResourceNotFound(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// An operation needing an identity was called without one.
    #[error("missing identity")]
    MissingIdentity,

    #[error("collection has no policy: {0}")]
    NoPolicy(String),

    #[error("relation not found in policy: {0}")]
    RelationNotFound(String),

    #[error("actor is not authorized to manage relationships of this document")]
    NotOwner,

    #[error("invalid actor: {0}")]
    InvalidActor(String),

    #[error("transaction not found: {0}")]
    TxnNotFound(u64),

    /// A concurrent transaction changed a document this one wrote.
    #[error("transaction conflict. Please retry")]
    TxnConflict,

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("block has no signature")]
    MissingSignature,

    #[error("signature verification failed")]
    SignatureMismatch,

    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// Node options are inconsistent.
    #[error("invalid node options: {0}")]
    InvalidOptions(String),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
