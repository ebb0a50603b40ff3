//! Identity primitives for the meshtest harness.
//!
//! Provides:
//! - [`KeyType`] selection between secp256k1 and ed25519
//! - Deterministic, seed-driven private key generation
//! - `did:key` identifiers derived from public keys
//! - Signed bearer tokens binding an identity to a node audience
//!
//! Keys generated from the same seed are byte-identical across runs, which
//! is what lets scenario fixtures compare identities and signatures exactly.

pub mod did;
mod error;
mod identity;
pub mod key;
pub mod token;

pub use did::{did_from_public_key, public_key_from_did};
pub use error::{IdentityError, IdentityResult};
pub use identity::Identity;
pub use key::{generate_private_key, KeyType, PrivateKey, PublicKey};
pub use token::{verify_token, TokenClaims};
