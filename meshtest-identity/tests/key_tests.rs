use meshtest_identity::{did_from_public_key, generate_private_key, KeyType, PrivateKey, PublicKey};
use proptest::prelude::*;

// ── KeyType ──────────────────────────────────────────────────────

#[test]
fn default_key_type_is_secp256k1() {
    assert_eq!(KeyType::default(), KeyType::Secp256k1);
}

#[test]
fn key_type_parses_case_insensitively() {
    assert_eq!("ED25519".parse::<KeyType>().unwrap(), KeyType::Ed25519);
    assert_eq!("secp256k1".parse::<KeyType>().unwrap(), KeyType::Secp256k1);
}

#[test]
fn unknown_key_type_is_rejected() {
    let err = "rsa".parse::<KeyType>().unwrap_err();
    assert!(err.to_string().contains("unsupported key type"));
}

// ── Generation ───────────────────────────────────────────────────

#[test]
fn same_seed_same_key() {
    for key_type in [KeyType::Secp256k1, KeyType::Ed25519] {
        let a = generate_private_key(key_type, 7);
        let b = generate_private_key(key_type, 7);
        assert_eq!(*a.to_bytes(), *b.to_bytes());
    }
}

#[test]
fn seed_zero_key_material_is_pinned() {
    const SECRET: &str = "b2f7f581d6de3c06a822fd6e7e8265fbc00f8401696a5bdc34f5a6d2ff3f922f";

    let ed = generate_private_key(KeyType::Ed25519, 0);
    assert_eq!(hex::encode(&*ed.to_bytes()), SECRET);
    assert_eq!(
        did_from_public_key(&ed.public_key()),
        "did:key:z6MkvTbUjUVTwwMEsqxipAsL9YUvRaAC22rFzQCHf7RnbTbx"
    );

    let secp = generate_private_key(KeyType::Secp256k1, 0);
    assert_eq!(hex::encode(&*secp.to_bytes()), SECRET);
    assert_eq!(
        did_from_public_key(&secp.public_key()),
        "did:key:zQ3shiP6RKwTKnfjP2gDDEYTLa43m3qSJChhG6fjhkxNXSpn4"
    );
}

#[test]
fn different_seeds_different_keys() {
    let a = generate_private_key(KeyType::Secp256k1, 0);
    let b = generate_private_key(KeyType::Secp256k1, 1);
    assert_ne!(*a.to_bytes(), *b.to_bytes());
}

#[test]
fn key_type_is_preserved() {
    assert_eq!(generate_private_key(KeyType::Ed25519, 3).key_type(), KeyType::Ed25519);
    assert_eq!(
        generate_private_key(KeyType::Secp256k1, 3).public_key().key_type(),
        KeyType::Secp256k1
    );
}

#[test]
fn private_key_bytes_roundtrip() {
    for key_type in [KeyType::Secp256k1, KeyType::Ed25519] {
        let key = generate_private_key(key_type, 11);
        let restored = PrivateKey::from_bytes(key_type, &key.to_bytes()).unwrap();
        assert_eq!(key.public_key(), restored.public_key());
    }
}

#[test]
fn secp256k1_public_key_is_compressed() {
    let key = generate_private_key(KeyType::Secp256k1, 1).public_key();
    assert_eq!(key.to_bytes().len(), 33);
}

#[test]
fn debug_output_redacts_secret() {
    let key = generate_private_key(KeyType::Ed25519, 1);
    assert!(format!("{key:?}").contains("REDACTED"));
}

// ── Signatures ───────────────────────────────────────────────────

#[test]
fn sign_and_verify() {
    for key_type in [KeyType::Secp256k1, KeyType::Ed25519] {
        let key = generate_private_key(key_type, 5);
        let sig = key.sign(b"block bytes");
        key.public_key().verify(b"block bytes", &sig).unwrap();
    }
}

#[test]
fn verify_rejects_other_message() {
    let key = generate_private_key(KeyType::Secp256k1, 5);
    let sig = key.sign(b"one");
    assert!(key.public_key().verify(b"two", &sig).is_err());
}

#[test]
fn verify_rejects_other_key() {
    let key = generate_private_key(KeyType::Ed25519, 5);
    let other = generate_private_key(KeyType::Ed25519, 6);
    let sig = key.sign(b"msg");
    assert!(other.public_key().verify(b"msg", &sig).is_err());
}

#[test]
fn public_key_rejects_bad_length() {
    assert!(PublicKey::from_bytes(KeyType::Ed25519, &[0u8; 5]).is_err());
    assert!(PublicKey::from_bytes(KeyType::Secp256k1, &[0u8; 5]).is_err());
}

proptest! {
    #[test]
    fn generation_is_deterministic(seed in any::<u64>()) {
        let a = generate_private_key(KeyType::Ed25519, seed);
        let b = generate_private_key(KeyType::Ed25519, seed);
        prop_assert_eq!(a.public_key(), b.public_key());
    }
}
