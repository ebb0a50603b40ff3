use meshtest_harness::actions::{start_node, StartNode};
use meshtest_harness::config::ClientType;
use meshtest_harness::identity::{IdentityKind, IdentityRef, Selector};
use meshtest_harness::state::RunSelectors;
use meshtest_harness::{
    all_client_identities, client_identity, node_identity, HarnessConfig, HarnessError, State,
};
use meshtest_identity::{verify_token, KeyType};
use meshtest_node::{DatabaseType, KmsType, SimNetwork};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

fn new_state() -> State {
    State::new(
        HarnessConfig::default(),
        RunSelectors {
            database: DatabaseType::Memory,
            kms: KmsType::None,
            client: ClientType::InProcess,
        },
        Arc::new(SimNetwork::new()),
        Vec::new(),
    )
}

fn identity_ref(is_node: bool, index: usize) -> IdentityRef {
    IdentityRef {
        kind: if is_node {
            IdentityKind::Node
        } else {
            IdentityKind::Client
        },
        selector: Selector::Index(index),
    }
}

// ── Generation ───────────────────────────────────────────────────

#[test]
fn resolving_twice_returns_the_cached_identity() {
    let mut state = new_state();
    let first = state.get_identity(client_identity(0)).unwrap().unwrap();
    let second = state.get_identity(client_identity(0)).unwrap().unwrap();
    assert_eq!(first.did(), second.did());
    assert_eq!(state.generated_identity_count(), 1);
}

#[test]
fn distinct_references_get_distinct_keys() {
    let mut state = new_state();
    let client = state.get_identity(client_identity(0)).unwrap().unwrap();
    let node = state.get_identity(node_identity(0)).unwrap().unwrap();
    assert_ne!(client.did(), node.did());
    assert_eq!(state.generated_identity_count(), 2);
}

#[test]
fn no_identity_resolves_to_none() {
    let mut state = new_state();
    assert!(state.get_identity(None).unwrap().is_none());
    assert_eq!(state.generated_identity_count(), 0);
}

#[test]
fn key_type_overrides_apply() {
    let mut state = new_state();
    let reference = client_identity(1).unwrap();
    state.identity_types.insert(reference, KeyType::Ed25519);

    let overridden = state.get_identity(Some(reference)).unwrap().unwrap();
    let default = state.get_identity(client_identity(0)).unwrap().unwrap();
    assert_eq!(overridden.key_type(), KeyType::Ed25519);
    assert_eq!(default.key_type(), KeyType::Secp256k1);
}

#[test]
fn broadcast_selector_is_only_a_target() {
    let mut state = new_state();
    let all = all_client_identities().unwrap();
    assert_eq!(state.identity_did(all).unwrap(), "*");
    assert!(matches!(
        state.get_identity_holder(all),
        Err(HarnessError::Identity(_))
    ));
    assert_eq!(all.to_string(), "client:*");
}

proptest! {
    #[test]
    fn same_order_same_dids(refs in proptest::collection::vec((any::<bool>(), 0usize..4), 1..12)) {
        let mut a = new_state();
        let mut b = new_state();
        for &(is_node, index) in &refs {
            let reference = identity_ref(is_node, index);
            let left = a.identity_did(reference).unwrap();
            let right = b.identity_did(reference).unwrap();
            prop_assert_eq!(left, right);
        }
        prop_assert_eq!(a.generated_identity_count(), b.generated_identity_count());
    }

    #[test]
    fn repeated_resolution_is_idempotent(index in 0usize..8, repeats in 1usize..5) {
        let mut state = new_state();
        let reference = identity_ref(false, index);
        let first = state.identity_did(reference).unwrap();
        for _ in 0..repeats {
            prop_assert_eq!(state.identity_did(reference).unwrap(), first.clone());
        }
        prop_assert_eq!(state.generated_identity_count(), 1);
    }
}

// ── Tokens ───────────────────────────────────────────────────────

#[tokio::test]
async fn tokens_are_issued_once_per_node() {
    let mut state = new_state();
    start_node(&mut state, &StartNode::default()).await.unwrap();
    start_node(&mut state, &StartNode::default()).await.unwrap();

    let first = state.identity_for_request(client_identity(0), 0).unwrap().unwrap();
    let again = state.identity_for_request(client_identity(0), 0).unwrap().unwrap();
    let other = state.identity_for_request(client_identity(0), 1).unwrap().unwrap();
    assert_eq!(first, again);
    assert_ne!(first, other);

    let audience = state.node(0).unwrap().peer_id().to_string();
    let claims = verify_token(&first, &audience).unwrap();
    let did = state.identity_did(client_identity(0).unwrap()).unwrap();
    assert_eq!(claims.sub, did);
}

#[tokio::test]
async fn nodes_start_with_their_node_identity() {
    let mut state = new_state();
    let index = start_node(&mut state, &StartNode::default()).await.unwrap();
    let expected = state.get_identity(node_identity(index)).unwrap().unwrap();
    let options = &state.node(index).unwrap().options;
    assert_eq!(
        options.identity.as_ref().map(|i| i.did().to_string()),
        Some(expected.did().to_string())
    );
}
