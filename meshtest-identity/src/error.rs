//! Error types for the identity layer.

use thiserror::Error;

/// Result type for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Errors that can occur in identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The key type is not supported.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Key bytes could not be decoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The DID is malformed.
    #[error("invalid DID: {0}")]
    InvalidDid(String),

    /// A signature did not verify.
    #[error("signature verification failed")]
    InvalidSignature,

    /// The token is malformed.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The token was issued for a different audience.
    #[error("token audience mismatch: expected {expected}, got {actual}")]
    AudienceMismatch { expected: String, actual: String },

    /// The token has expired.
    #[error("token expired")]
    TokenExpired,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
