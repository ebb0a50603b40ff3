//! Key types and deterministic key generation.
//!
//! A private key is generated from a `u64` seed: the seed initializes a
//! cryptographically strong PRNG whose stream is consumed by the curve's
//! key generator. The same seed and key type always produce the same key.

use crate::error::{IdentityError, IdentityResult};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::elliptic_curve::sec1::ToEncodedPoint as _;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Supported signature schemes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    Secp256k1,
    Ed25519,
}

impl KeyType {
    /// Lowercase name of the key type.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Secp256k1 => "secp256k1",
            KeyType::Ed25519 => "ed25519",
        }
    }

    /// Multicodec prefix used in `did:key` identifiers.
    pub(crate) fn multicodec(&self) -> [u8; 2] {
        match self {
            KeyType::Secp256k1 => [0xe7, 0x01],
            KeyType::Ed25519 => [0xed, 0x01],
        }
    }

    /// JWS algorithm name.
    pub(crate) fn jws_alg(&self) -> &'static str {
        match self {
            KeyType::Secp256k1 => "ES256K",
            KeyType::Ed25519 => "EdDSA",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "secp256k1" => Ok(KeyType::Secp256k1),
            "ed25519" => Ok(KeyType::Ed25519),
            other => Err(IdentityError::UnsupportedKeyType(other.to_string())),
        }
    }
}

/// Generates a private key of the given type from a seed.
///
/// The generator is ChaCha20 with a fixed seed expansion, so a seed yields
/// the same key bytes on every platform and across dependency upgrades.
pub fn generate_private_key(key_type: KeyType, seed: u64) -> PrivateKey {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    match key_type {
        KeyType::Secp256k1 => PrivateKey::Secp256k1(k256::ecdsa::SigningKey::random(&mut rng)),
        KeyType::Ed25519 => PrivateKey::Ed25519(ed25519_dalek::SigningKey::generate(&mut rng)),
    }
}

/// A private signing key of any supported type.
///
/// Both inner key types wipe their secret material on drop.
#[derive(Clone)]
pub enum PrivateKey {
    Secp256k1(k256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl PrivateKey {
    /// Restores a private key from raw secret bytes.
    pub fn from_bytes(key_type: KeyType, bytes: &[u8]) -> IdentityResult<Self> {
        match key_type {
            KeyType::Secp256k1 => k256::ecdsa::SigningKey::from_slice(bytes)
                .map(PrivateKey::Secp256k1)
                .map_err(|e| IdentityError::InvalidKey(e.to_string())),
            KeyType::Ed25519 => {
                let raw: [u8; 32] = bytes.try_into().map_err(|_| {
                    IdentityError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
                })?;
                Ok(PrivateKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&raw)))
            }
        }
    }

    /// The key's type.
    pub fn key_type(&self) -> KeyType {
        match self {
            PrivateKey::Secp256k1(_) => KeyType::Secp256k1,
            PrivateKey::Ed25519(_) => KeyType::Ed25519,
        }
    }

    /// Raw secret bytes, wiped when the returned buffer drops.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        match self {
            PrivateKey::Secp256k1(k) => Zeroizing::new(k.to_bytes().to_vec()),
            PrivateKey::Ed25519(k) => Zeroizing::new(k.to_bytes().to_vec()),
        }
    }

    /// Derives the matching public key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Secp256k1(k) => PublicKey::Secp256k1(k256::ecdsa::VerifyingKey::from(k)),
            PrivateKey::Ed25519(k) => PublicKey::Ed25519(k.verifying_key()),
        }
    }

    /// Signs a message.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            PrivateKey::Secp256k1(k) => {
                let sig: k256::ecdsa::Signature = k.sign(message);
                sig.to_bytes().to_vec()
            }
            PrivateKey::Ed25519(k) => ed25519_dalek::Signer::sign(k, message).to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_type", &self.key_type())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A public verification key of any supported type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Secp256k1(k256::ecdsa::VerifyingKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    /// Decodes a public key. Secp256k1 keys are SEC1 encoded.
    pub fn from_bytes(key_type: KeyType, bytes: &[u8]) -> IdentityResult<Self> {
        match key_type {
            KeyType::Secp256k1 => k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                .map(PublicKey::Secp256k1)
                .map_err(|e| IdentityError::InvalidKey(e.to_string())),
            KeyType::Ed25519 => {
                let raw: [u8; 32] = bytes.try_into().map_err(|_| {
                    IdentityError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
                })?;
                ed25519_dalek::VerifyingKey::from_bytes(&raw)
                    .map(PublicKey::Ed25519)
                    .map_err(|e| IdentityError::InvalidKey(e.to_string()))
            }
        }
    }

    /// The key's type.
    pub fn key_type(&self) -> KeyType {
        match self {
            PublicKey::Secp256k1(_) => KeyType::Secp256k1,
            PublicKey::Ed25519(_) => KeyType::Ed25519,
        }
    }

    /// Encoded key bytes; compressed SEC1 for secp256k1.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::Secp256k1(k) => k.to_encoded_point(true).as_bytes().to_vec(),
            PublicKey::Ed25519(k) => k.to_bytes().to_vec(),
        }
    }

    /// Verifies a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> IdentityResult<()> {
        match self {
            PublicKey::Secp256k1(k) => {
                let sig = k256::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| IdentityError::InvalidSignature)?;
                k.verify(message, &sig)
                    .map_err(|_| IdentityError::InvalidSignature)
            }
            PublicKey::Ed25519(k) => {
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| IdentityError::InvalidSignature)?;
                ed25519_dalek::Verifier::verify(k, message, &sig)
                    .map_err(|_| IdentityError::InvalidSignature)
            }
        }
    }
}
