//! A keypair together with its derived public identifier.

use crate::did::did_from_public_key;
use crate::error::IdentityResult;
use crate::key::{generate_private_key, KeyType, PrivateKey, PublicKey};
use crate::token;
use chrono::Duration;
use std::fmt;

/// A signing identity: private key, public key and DID.
#[derive(Clone)]
pub struct Identity {
    private_key: PrivateKey,
    public_key: PublicKey,
    did: String,
}

impl Identity {
    /// Wraps an existing private key.
    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        let did = did_from_public_key(&public_key);
        Self {
            private_key,
            public_key,
            did,
        }
    }

    /// Generates an identity deterministically from a seed.
    pub fn from_seed(key_type: KeyType, seed: u64) -> Self {
        Self::from_private_key(generate_private_key(key_type, seed))
    }

    /// The `did:key` identifier.
    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn key_type(&self) -> KeyType {
        self.private_key.key_type()
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Signs a message with the private key.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.private_key.sign(message)
    }

    /// Issues a bearer token for `audience`, valid for `ttl`.
    pub fn issue_token(&self, audience: &str, ttl: Duration) -> IdentityResult<String> {
        token::issue(self, audience, ttl)
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.did == other.did
    }
}

impl Eq for Identity {}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("did", &self.did)
            .field("key_type", &self.key_type())
            .finish()
    }
}
