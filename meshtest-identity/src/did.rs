//! `did:key` encoding.
//!
//! A DID is `did:key:z` followed by the base58btc encoding of the key type's
//! multicodec prefix and the encoded public key.

use crate::error::{IdentityError, IdentityResult};
use crate::key::{KeyType, PublicKey};

const DID_KEY_PREFIX: &str = "did:key:z";

/// Encodes a public key as a `did:key` identifier.
pub fn did_from_public_key(key: &PublicKey) -> String {
    let mut bytes = key.key_type().multicodec().to_vec();
    bytes.extend(key.to_bytes());
    format!("{DID_KEY_PREFIX}{}", bs58::encode(bytes).into_string())
}

/// Decodes the public key embedded in a `did:key` identifier.
pub fn public_key_from_did(did: &str) -> IdentityResult<PublicKey> {
    let encoded = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| IdentityError::InvalidDid(did.to_string()))?;
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| IdentityError::InvalidDid(e.to_string()))?;
    if bytes.len() < 2 {
        return Err(IdentityError::InvalidDid(did.to_string()));
    }

    let key_type = [KeyType::Secp256k1, KeyType::Ed25519]
        .into_iter()
        .find(|t| t.multicodec() == bytes[..2])
        .ok_or_else(|| IdentityError::InvalidDid(format!("unknown multicodec in {did}")))?;
    PublicKey::from_bytes(key_type, &bytes[2..])
}
