use chrono::Duration as TokenTtl;
use meshtest_identity::{Identity, KeyType};
use meshtest_node::{
    AacStatus, Client, DatabaseType, KmsType, LensConfig, LensOp, NodeError, NodeFactory,
    NodeOptions, RequestContext, SimNetwork, SimNode, Subscription,
};
use meshtest_types::{DocId, EventTopic, NodeEvent};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const USERS: &str = "type Users { name: String age: Int }";

async fn start(network: &SimNetwork) -> Arc<SimNode> {
    network.start(NodeOptions::default()).await.unwrap()
}

async fn start_with_users(network: &SimNetwork) -> Arc<SimNode> {
    let node = start(network).await;
    node.add_schema(&ctx(), USERS).await.unwrap();
    node
}

fn ctx() -> RequestContext {
    RequestContext::new()
}

fn token_ctx(identity: &Identity, node: &SimNode) -> RequestContext {
    let token = identity
        .issue_token(&node.peer_id().to_string(), TokenTtl::minutes(5))
        .unwrap();
    RequestContext::new().with_token(Some(token))
}

async fn next_event(sub: &mut Subscription) -> NodeEvent {
    tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event bus closed")
}

async fn create_john(node: &SimNode) -> DocId {
    node.create_docs(&ctx(), "Users", vec![json!({"name": "John", "age": 21})], false)
        .await
        .unwrap()
        .remove(0)
}

async fn names(node: &SimNode, ctx: &RequestContext) -> Vec<Value> {
    let result = node.exec_request(ctx, "{ Users { name } }").await.unwrap();
    result["Users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].clone())
        .collect()
}

// ── Schema ───────────────────────────────────────────────────────

#[tokio::test]
async fn collection_roots_do_not_depend_on_declaration_order() {
    let network = SimNetwork::new();
    let first = start(&network).await;
    let second = start(&network).await;
    let created = first
        .add_schema(&ctx(), "type Users { name: String } type Books { title: String }")
        .await
        .unwrap();
    assert_ne!(created[0].root_id, created[1].root_id);
    assert_eq!(first.get_collections(&ctx()).await.unwrap().len(), 2);

    let books = second
        .add_schema(&ctx(), "type Books { title: String }")
        .await
        .unwrap();
    assert_eq!(books[0].root_id, created[1].root_id);
}

#[tokio::test]
async fn recreating_a_renamed_definition_gets_a_fresh_root() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    node.patch_collection(
        &ctx(),
        r#"[{"op": "rename", "collection": "Users", "name": "People"}]"#,
    )
    .await
    .unwrap();
    let again = node.add_schema(&ctx(), USERS).await.unwrap();
    let people = node
        .get_collections(&ctx())
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == "People")
        .unwrap();
    assert_ne!(again[0].root_id, people.root_id);
}

#[tokio::test]
async fn duplicate_collection_is_rejected() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let err = node.add_schema(&ctx(), USERS).await.unwrap_err();
    assert!(err.to_string().contains("collection already exists"));
}

#[tokio::test]
async fn patch_keeps_root_and_records_versions() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let before = node.get_collections(&ctx()).await.unwrap().remove(0);

    node.patch_collection(
        &ctx(),
        r#"[{"op": "rename", "collection": "Users", "name": "People"},
            {"op": "add_field", "collection": "People", "field": {"name": "email", "kind": "String"}}]"#,
    )
    .await
    .unwrap();

    let after = node.get_collections(&ctx()).await.unwrap().remove(0);
    assert_eq!(after.name, "People");
    assert_eq!(after.root_id, before.root_id);
    assert_eq!(after.versions().len(), 3);
    assert_eq!(after.versions()[0], &before.version_id);
}

#[tokio::test]
async fn failing_patch_changes_nothing() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let err = node
        .patch_collection(
            &ctx(),
            r#"[{"op": "rename", "collection": "Users", "name": "People"},
                {"op": "add_field", "collection": "People", "field": {"name": "name", "kind": "String"}}]"#,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::FieldExists(_)));
    assert_eq!(node.get_collections(&ctx()).await.unwrap()[0].name, "Users");
}

// ── Documents ────────────────────────────────────────────────────

#[tokio::test]
async fn create_publishes_update_event() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let mut updates = node.events().subscribe(EventTopic::Update).unwrap();

    let doc_id = create_john(&node).await;
    match next_event(&mut updates).await {
        NodeEvent::Update(e) => {
            assert_eq!(e.doc_id, doc_id);
            assert!(e.is_create);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn same_document_same_id_on_every_node() {
    let network = SimNetwork::new();
    let a = start_with_users(&network).await;
    let b = start_with_users(&network).await;
    assert_eq!(create_john(&a).await, create_john(&b).await);
}

#[tokio::test]
async fn create_validates_fields() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;

    let err = node
        .create_docs(&ctx(), "Users", vec![json!({"nickname": "J"})], false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("the given field does not exist"));

    let err = node
        .create_docs(&ctx(), "Users", vec![json!({"age": "old"})], false)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::InvalidFieldValue { .. }));
}

#[tokio::test]
async fn duplicate_document_is_rejected() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    create_john(&node).await;
    let err = node
        .create_docs(&ctx(), "Users", vec![json!({"name": "John", "age": 21})], false)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::DocumentExists(_)));
}

#[tokio::test]
async fn update_and_delete_are_visible_to_requests() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let doc_id = create_john(&node).await;

    node.update_doc(&ctx(), "Users", &doc_id, json!({"name": "Johnny"}))
        .await
        .unwrap();
    let result = node
        .exec_request(&ctx(), "{ Users { _docID name age } }")
        .await
        .unwrap();
    assert_eq!(
        result,
        json!({"Users": [{"_docID": doc_id.to_string(), "name": "Johnny", "age": 21}]})
    );

    node.delete_doc(&ctx(), "Users", &doc_id).await.unwrap();
    assert_eq!(names(&node, &ctx()).await, Vec::<Value>::new());
    let err = node
        .update_doc(&ctx(), "Users", &doc_id, json!({"age": 1}))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "document not found or not authorized to access");
}

#[tokio::test]
async fn head_advances_on_update() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let doc_id = create_john(&node).await;
    let first = node.doc_head(&ctx(), "Users", &doc_id).await.unwrap().unwrap();
    node.update_doc(&ctx(), "Users", &doc_id, json!({"age": 22}))
        .await
        .unwrap();
    let second = node.doc_head(&ctx(), "Users", &doc_id).await.unwrap().unwrap();
    assert_ne!(first, second);
}

#[tokio::test]
async fn request_filters_by_doc_id() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let john = create_john(&node).await;
    node.create_docs(&ctx(), "Users", vec![json!({"name": "Islam"})], false)
        .await
        .unwrap();

    let request = format!(r#"{{ Users(docID: "{john}") {{ name }} }}"#);
    let result = node.exec_request(&ctx(), &request).await.unwrap();
    assert_eq!(result, json!({"Users": [{"name": "John"}]}));
}

// ── Replication ──────────────────────────────────────────────────

#[tokio::test]
async fn replicator_pushes_existing_then_completes() {
    let network = SimNetwork::new();
    let source = start_with_users(&network).await;
    let target = start_with_users(&network).await;
    let doc_id = create_john(&source).await;

    let mut completed = source
        .events()
        .subscribe(EventTopic::ReplicatorCompleted)
        .unwrap();
    let mut merges = target.events().subscribe(EventTopic::MergeComplete).unwrap();

    source.set_replicator(&target.peer_info()).await.unwrap();

    match next_event(&mut merges).await {
        NodeEvent::MergeComplete(e) => {
            assert_eq!(e.doc_id, doc_id);
            assert_eq!(e.by_peer, source.peer_id());
            assert!(e.decrypted);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(
        next_event(&mut completed).await,
        NodeEvent::ReplicatorCompleted(e) if e.peer == target.peer_id()
    ));
    assert_eq!(names(&target, &ctx()).await, vec![json!("John")]);
    assert_eq!(
        source.get_all_replicators().await.unwrap(),
        vec![target.peer_id()]
    );
}

#[tokio::test]
async fn replicator_receives_later_updates() {
    let network = SimNetwork::new();
    let source = start_with_users(&network).await;
    let target = start_with_users(&network).await;
    source.set_replicator(&target.peer_info()).await.unwrap();

    let mut merges = target.events().subscribe(EventTopic::MergeComplete).unwrap();
    let doc_id = create_john(&source).await;
    next_event(&mut merges).await;
    source
        .update_doc(&ctx(), "Users", &doc_id, json!({"age": 40}))
        .await
        .unwrap();
    let NodeEvent::MergeComplete(merged) = next_event(&mut merges).await else {
        panic!("expected merge");
    };

    let head = source.doc_head(&ctx(), "Users", &doc_id).await.unwrap();
    assert_eq!(Some(merged.cid), head);
}

#[tokio::test]
async fn connected_peer_needs_interest() {
    let network = SimNetwork::new();
    let a = start_with_users(&network).await;
    let b = start_with_users(&network).await;
    a.connect(&b.peer_info()).await.unwrap();
    assert_eq!(a.connected_peers(), vec![b.peer_id()]);
    assert_eq!(b.connected_peers(), vec![a.peer_id()]);

    // Not subscribed: nothing arrives.
    create_john(&a).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(names(&b, &ctx()).await, Vec::<Value>::new());

    // Subscribed to the collection: new documents arrive.
    b.add_p2p_collections(&["Users".to_string()]).await.unwrap();
    let mut merges = b.events().subscribe(EventTopic::MergeComplete).unwrap();
    a.create_docs(&ctx(), "Users", vec![json!({"name": "Fred"})], false)
        .await
        .unwrap();
    next_event(&mut merges).await;
    assert_eq!(names(&b, &ctx()).await, vec![json!("Fred")]);
    assert_eq!(
        b.get_all_p2p_collections().await.unwrap(),
        vec!["Users".to_string()]
    );
}

#[tokio::test]
async fn document_subscription_brings_updates() {
    let network = SimNetwork::new();
    let a = start_with_users(&network).await;
    let b = start_with_users(&network).await;
    a.connect(&b.peer_info()).await.unwrap();
    let doc_id = create_john(&a).await;

    b.add_p2p_documents(std::slice::from_ref(&doc_id)).await.unwrap();
    let mut merges = b.events().subscribe(EventTopic::MergeComplete).unwrap();
    a.update_doc(&ctx(), "Users", &doc_id, json!({"age": 30}))
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut merges).await,
        NodeEvent::MergeComplete(e) if e.doc_id == doc_id
    ));
}

#[tokio::test]
async fn concurrent_writes_report_the_merged_block() {
    let network = SimNetwork::new();
    let a = start_with_users(&network).await;
    let b = start_with_users(&network).await;
    a.connect(&b.peer_info()).await.unwrap();
    b.add_p2p_collections(&["Users".to_string()]).await.unwrap();

    let mut b_merges = b.events().subscribe(EventTopic::MergeComplete).unwrap();
    let doc_id = create_john(&a).await;
    next_event(&mut b_merges).await;

    let mut a_updates = a.events().subscribe(EventTopic::Update).unwrap();
    let mut b_updates = b.events().subscribe(EventTopic::Update).unwrap();
    let mut a_merges = a.events().subscribe(EventTopic::MergeComplete).unwrap();
    a.update_doc(&ctx(), "Users", &doc_id, json!({"name": "A"}))
        .await
        .unwrap();
    b.update_doc(&ctx(), "Users", &doc_id, json!({"name": "B"}))
        .await
        .unwrap();

    let NodeEvent::Update(a_write) = next_event(&mut a_updates).await else {
        panic!("expected update");
    };
    let NodeEvent::Update(b_write) = next_event(&mut b_updates).await else {
        panic!("expected update");
    };
    let NodeEvent::MergeComplete(on_a) = next_event(&mut a_merges).await else {
        panic!("expected merge");
    };
    let NodeEvent::MergeComplete(on_b) = next_event(&mut b_merges).await else {
        panic!("expected merge");
    };
    assert_eq!(on_a.cid, b_write.cid);
    assert_eq!(on_b.cid, a_write.cid);

    let a_head = a.doc_head(&ctx(), "Users", &doc_id).await.unwrap();
    let b_head = b.doc_head(&ctx(), "Users", &doc_id).await.unwrap();
    assert_eq!(a_head, b_head);
}

#[tokio::test]
async fn subscribing_to_missing_collection_fails() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let err = node
        .add_p2p_collections(&["NonExistentCollection".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::CollectionNotFound(_)));
    assert!(node.get_all_p2p_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn encrypted_documents_need_kms() {
    let network = SimNetwork::new();
    let source = start_with_users(&network).await;
    let sealed = start_with_users(&network).await;
    let keyed = network
        .start(NodeOptions {
            kms: KmsType::PubSub,
            ..Default::default()
        })
        .await
        .unwrap();
    keyed.add_schema(&ctx(), USERS).await.unwrap();

    source
        .create_docs(&ctx(), "Users", vec![json!({"name": "Secret"})], true)
        .await
        .unwrap();

    for (target, expect_decrypted) in [(&sealed, false), (&keyed, true)] {
        let mut merges = target.events().subscribe(EventTopic::MergeComplete).unwrap();
        source.set_replicator(&target.peer_info()).await.unwrap();
        let NodeEvent::MergeComplete(e) = next_event(&mut merges).await else {
            panic!("expected merge");
        };
        assert_eq!(e.decrypted, expect_decrypted);
    }
    assert!(names(&sealed, &ctx()).await.is_empty());
    assert_eq!(names(&keyed, &ctx()).await, vec![json!("Secret")]);
}

#[tokio::test]
async fn unknown_peer_is_rejected() {
    let network = SimNetwork::new();
    let node = start(&network).await;
    let other = SimNetwork::new();
    let stranger = start(&other).await;
    assert!(matches!(
        node.connect(&stranger.peer_info()).await,
        Err(NodeError::PeerNotFound(_))
    ));
    assert!(matches!(
        node.delete_replicator(&stranger.peer_info()).await,
        Err(NodeError::PeerNotFound(_))
    ));
}

// ── Transactions ─────────────────────────────────────────────────

#[tokio::test]
async fn transaction_writes_apply_on_commit() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let mut updates = node.events().subscribe(EventTopic::Update).unwrap();
    let txn = node.new_txn().await.unwrap();
    let txn_ctx = ctx().with_txn(Some(txn));

    node.create_docs(&txn_ctx, "Users", vec![json!({"name": "John"})], false)
        .await
        .unwrap();
    assert_eq!(names(&node, &txn_ctx).await, vec![json!("John")]);
    assert!(names(&node, &ctx()).await.is_empty());
    assert!(updates.try_recv().is_none());

    node.commit_txn(txn).await.unwrap();
    next_event(&mut updates).await;
    assert_eq!(names(&node, &ctx()).await, vec![json!("John")]);
}

#[tokio::test]
async fn conflicting_transactions() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let doc_id = create_john(&node).await;

    let t1 = node.new_txn().await.unwrap();
    let t2 = node.new_txn().await.unwrap();
    node.update_doc(&ctx().with_txn(Some(t1)), "Users", &doc_id, json!({"age": 1}))
        .await
        .unwrap();
    node.update_doc(&ctx().with_txn(Some(t2)), "Users", &doc_id, json!({"age": 2}))
        .await
        .unwrap();

    node.commit_txn(t1).await.unwrap();
    let err = node.commit_txn(t2).await.unwrap_err();
    assert_eq!(err.to_string(), "transaction conflict. Please retry");
}

#[tokio::test]
async fn discarded_transaction_leaves_no_trace() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let txn = node.new_txn().await.unwrap();
    node.create_docs(&ctx().with_txn(Some(txn)), "Users", vec![json!({"name": "X"})], false)
        .await
        .unwrap();
    node.discard_txn(txn).await.unwrap();
    assert!(names(&node, &ctx()).await.is_empty());
    assert!(matches!(
        node.commit_txn(txn).await,
        Err(NodeError::TxnNotFound(_))
    ));
}

// ── Migrations ───────────────────────────────────────────────────

async fn add_email_field(node: &SimNode) -> LensConfig {
    let before = node.get_collections(&ctx()).await.unwrap().remove(0);
    node.patch_collection(
        &ctx(),
        r#"[{"op": "add_field", "collection": "Users", "field": {"name": "email", "kind": "String"}}]"#,
    )
    .await
    .unwrap();
    let after = node.get_collections(&ctx()).await.unwrap().remove(0);
    LensConfig {
        collection: "Users".into(),
        source_version: before.version_id,
        destination_version: after.version_id,
        ops: vec![LensOp::SetDefault {
            field: "email".into(),
            value: json!("unknown@example.com"),
        }],
    }
}

#[tokio::test]
async fn migration_transforms_old_documents() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    create_john(&node).await;
    let lens = add_email_field(&node).await;
    node.set_migration(&ctx(), lens).await.unwrap();

    let result = node.exec_request(&ctx(), "{ Users { name email } }").await.unwrap();
    assert_eq!(
        result,
        json!({"Users": [{"name": "John", "email": "unknown@example.com"}]})
    );
}

#[tokio::test]
async fn migration_in_transaction_is_not_seen_by_same_transaction() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    create_john(&node).await;
    let lens = add_email_field(&node).await;

    let txn = node.new_txn().await.unwrap();
    let txn_ctx = ctx().with_txn(Some(txn));
    node.set_migration(&txn_ctx, lens).await.unwrap();
    let inside = node.exec_request(&txn_ctx, "{ Users { email } }").await.unwrap();
    assert_eq!(inside, json!({"Users": [{"email": null}]}));

    node.commit_txn(txn).await.unwrap();
    let after = node.exec_request(&ctx(), "{ Users { email } }").await.unwrap();
    assert_eq!(after, json!({"Users": [{"email": "unknown@example.com"}]}));
}

#[tokio::test]
async fn migration_requires_known_versions() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let mut lens = add_email_field(&node).await;
    lens.source_version = meshtest_types::CollectionVersionId::derive(b"nope");
    assert!(matches!(
        node.set_migration(&ctx(), lens).await,
        Err(NodeError::VersionNotFound(_))
    ));
}

// ── Signatures ───────────────────────────────────────────────────

#[tokio::test]
async fn signed_blocks_verify_against_node_identity() {
    let network = SimNetwork::new();
    let identity = Identity::from_seed(KeyType::Ed25519, 1);
    let node = network
        .start(NodeOptions {
            identity: Some(identity.clone()),
            enable_signing: true,
            ..Default::default()
        })
        .await
        .unwrap();
    node.add_schema(&ctx(), USERS).await.unwrap();
    let doc_id = create_john(&node).await;
    let head = node.doc_head(&ctx(), "Users", &doc_id).await.unwrap().unwrap();

    node.verify_signature(&ctx(), &head, identity.public_key())
        .await
        .unwrap();

    let other = Identity::from_seed(KeyType::Ed25519, 2);
    let err = node
        .verify_signature(&ctx(), &head, other.public_key())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "signature verification failed");
}

#[tokio::test]
async fn unsigned_block_has_no_signature() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let doc_id = create_john(&node).await;
    let head = node.doc_head(&ctx(), "Users", &doc_id).await.unwrap().unwrap();
    let key = Identity::from_seed(KeyType::Secp256k1, 1);
    assert!(matches!(
        node.verify_signature(&ctx(), &head, key.public_key()).await,
        Err(NodeError::MissingSignature)
    ));
}

#[tokio::test]
async fn signing_requires_identity() {
    let network = SimNetwork::new();
    let err = network
        .start(NodeOptions {
            enable_signing: true,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::InvalidOptions(_)));
}

// ── Access control ───────────────────────────────────────────────

async fn policy_node(network: &SimNetwork, owner: &Identity) -> (Arc<SimNode>, DocId) {
    let node = start(network).await;
    let owner_ctx = token_ctx(owner, &node);
    let policy_id = node
        .add_dac_policy(&owner_ctx, r#"{"name": "test", "resources": ["users"]}"#)
        .await
        .unwrap();
    node.add_schema(
        &ctx(),
        &format!(r#"type Users @policy(id: "{policy_id}", resource: "users") {{ name: String }}"#),
    )
    .await
    .unwrap();
    let doc_id = node
        .create_docs(&owner_ctx, "Users", vec![json!({"name": "Private"})], false)
        .await
        .unwrap()
        .remove(0);
    (node, doc_id)
}

#[tokio::test]
async fn policy_requires_identity() {
    let network = SimNetwork::new();
    let node = start(&network).await;
    let err = node
        .add_dac_policy(&ctx(), r#"{"name": "test", "resources": ["users"]}"#)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "missing identity");
}

#[tokio::test]
async fn schema_must_reference_known_policy() {
    let network = SimNetwork::new();
    let node = start(&network).await;
    let err = node
        .add_schema(&ctx(), r#"type Users @policy(id: "missing", resource: "users") { name: String }"#)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::PolicyNotFound(_)));
}

#[tokio::test]
async fn owned_documents_are_private() {
    let network = SimNetwork::new();
    let owner = Identity::from_seed(KeyType::Secp256k1, 1);
    let stranger = Identity::from_seed(KeyType::Secp256k1, 2);
    let (node, _) = policy_node(&network, &owner).await;

    assert_eq!(names(&node, &token_ctx(&owner, &node)).await, vec![json!("Private")]);
    assert!(names(&node, &token_ctx(&stranger, &node)).await.is_empty());
    assert!(names(&node, &ctx()).await.is_empty());
}

#[tokio::test]
async fn relationships_grant_access() {
    let network = SimNetwork::new();
    let owner = Identity::from_seed(KeyType::Secp256k1, 1);
    let reader = Identity::from_seed(KeyType::Secp256k1, 2);
    let (node, doc_id) = policy_node(&network, &owner).await;
    let owner_ctx = token_ctx(&owner, &node);
    let reader_ctx = token_ctx(&reader, &node);

    let existed = node
        .add_doc_actor_relationship(&owner_ctx, "Users", &doc_id, "reader", reader.did())
        .await
        .unwrap();
    assert!(!existed);
    assert_eq!(names(&node, &reader_ctx).await, vec![json!("Private")]);
    assert!(node
        .update_doc(&reader_ctx, "Users", &doc_id, json!({"name": "Mine"}))
        .await
        .is_err());

    let found = node
        .delete_doc_actor_relationship(&owner_ctx, "Users", &doc_id, "reader", reader.did())
        .await
        .unwrap();
    assert!(found);
    assert!(names(&node, &reader_ctx).await.is_empty());
}

#[tokio::test]
async fn only_owner_manages_relationships() {
    let network = SimNetwork::new();
    let owner = Identity::from_seed(KeyType::Secp256k1, 1);
    let other = Identity::from_seed(KeyType::Secp256k1, 2);
    let (node, doc_id) = policy_node(&network, &owner).await;

    let err = node
        .add_doc_actor_relationship(&token_ctx(&other, &node), "Users", &doc_id, "reader", "*")
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::NotOwner));
    let err = node
        .add_doc_actor_relationship(&ctx(), "Users", &doc_id, "reader", "*")
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::MissingIdentity));
}

#[tokio::test]
async fn token_for_other_node_is_rejected() {
    let network = SimNetwork::new();
    let a = start_with_users(&network).await;
    let b = start_with_users(&network).await;
    let identity = Identity::from_seed(KeyType::Secp256k1, 1);
    let err = a
        .exec_request(&token_ctx(&identity, &b), "{ Users { name } }")
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Identity(_)));
}

#[tokio::test]
async fn admin_acp_lifecycle() {
    let network = SimNetwork::new();
    let admin = Identity::from_seed(KeyType::Secp256k1, 1);
    let node = network
        .start(NodeOptions {
            identity: Some(admin.clone()),
            enable_aac: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let admin_ctx = token_ctx(&admin, &node);

    assert_eq!(node.get_aac_status(&ctx()).await.unwrap(), AacStatus::Enabled);
    let err = node.add_schema(&ctx(), USERS).await.unwrap_err();
    assert_eq!(err.to_string(), "not authorized to perform operation");
    node.add_schema(&admin_ctx, USERS).await.unwrap();

    let err = node.disable_aac(&ctx()).await.unwrap_err();
    assert_eq!(err.to_string(), "not authorized to perform operation");
    node.re_enable_aac(&admin_ctx).await.unwrap();
    assert_eq!(node.get_aac_status(&ctx()).await.unwrap(), AacStatus::Enabled);

    node.disable_aac(&admin_ctx).await.unwrap();
    assert_eq!(
        node.get_aac_status(&ctx()).await.unwrap(),
        AacStatus::DisabledTemporarily
    );
    create_john(&node).await;
}

#[tokio::test]
async fn admin_acp_needs_identity() {
    let network = SimNetwork::new();
    let err = network
        .start(NodeOptions {
            enable_aac: true,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("admin acp requires a node identity"));
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn closed_node_rejects_calls() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    let mut updates = node.events().subscribe(EventTopic::Update).unwrap();
    node.close().await.unwrap();
    node.close().await.unwrap();

    assert!(node.is_closed());
    assert!(matches!(node.get_collections(&ctx()).await, Err(NodeError::Closed)));
    assert!(node.events().subscribe(EventTopic::Update).is_err());
    assert_eq!(updates.recv().await, None);
    assert_eq!(network.running_count(), 0);
}

#[tokio::test]
async fn memory_node_restarts_with_its_data() {
    let network = SimNetwork::new();
    let node = start_with_users(&network).await;
    create_john(&node).await;
    let peer_id = node.peer_id();
    node.close().await.unwrap();

    let restarted = network
        .start(NodeOptions {
            peer_id: Some(peer_id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(names(&restarted, &ctx()).await, vec![json!("John")]);
}

#[tokio::test]
async fn file_node_persists_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let options = NodeOptions {
        database: DatabaseType::File,
        root_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };

    let first = SimNetwork::new();
    let node = first.start(options.clone()).await.unwrap();
    node.add_schema(&ctx(), USERS).await.unwrap();
    create_john(&node).await;
    node.close().await.unwrap();
    assert!(dir.path().join(meshtest_node::DATASTORE_FILE).exists());

    // A fresh network has no memory of the node; only the file does.
    let second = SimNetwork::new();
    let node = second.start_node(options).await.unwrap();
    let result = node.exec_request(&ctx(), "{ Users { name } }").await.unwrap();
    assert_eq!(result, json!({"Users": [{"name": "John"}]}));
}

#[tokio::test]
async fn file_database_needs_root_dir() {
    let network = SimNetwork::new();
    let err = network
        .start(NodeOptions {
            database: DatabaseType::File,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::InvalidOptions(_)));
}

#[tokio::test]
async fn restarted_peer_cannot_run_twice() {
    let network = SimNetwork::new();
    let node = start(&network).await;
    let err = network
        .start(NodeOptions {
            peer_id: Some(node.peer_id()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::InvalidOptions(_)));
}
