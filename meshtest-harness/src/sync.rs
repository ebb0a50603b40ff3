//! Event synchronization.
//!
//! Writes and replication complete asynchronously. The functions here turn
//! node events into the harness's view of the network: a writer's update
//! events fix the heads its peers are expected to reach, and merge events
//! confirm the heads they actually reached. [`wait_for_sync`] blocks until
//! the two agree for every node, or the sync deadline passes.

use crate::error::{DocMismatch, HarnessError, HarnessResult, NodeMismatch, SyncMismatchReport};
use crate::state::{ColDocIndex, DocHeadState, State};
use futures::future::select_all;
use meshtest_types::{Cid, DocId, EventTopic, NodeEvent, UpdateEvent};
use std::collections::HashMap;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::debug;

/// Waits for the update events of documents written on `node` and records
/// the resulting heads.
///
/// `docs` lists one entry per write, so a document written twice must be
/// reported twice. An update of any other document is an error. Without a
/// network there is nobody to sync with and nothing is awaited.
pub async fn wait_for_update_events(
    state: &mut State,
    node: usize,
    docs: &[DocId],
) -> HarnessResult<()> {
    if !state.is_network_enabled || docs.is_empty() {
        return Ok(());
    }

    let mut remaining: HashMap<&DocId, usize> = HashMap::new();
    for doc_id in docs {
        *remaining.entry(doc_id).or_default() += 1;
    }

    let event_timeout = state.config.event_timeout;
    while !remaining.is_empty() {
        let subscription = &mut state.node_mut(node)?.event.update;
        let event = match timeout(event_timeout, subscription.recv()).await {
            Ok(Some(NodeEvent::Update(event))) => event,
            Ok(Some(_)) => continue,
            Ok(None) => {
                return Err(HarnessError::EventChannelClosed {
                    node,
                    topic: EventTopic::Update,
                });
            }
            Err(_) => {
                return Err(HarnessError::EventTimeout {
                    node,
                    topic: EventTopic::Update,
                });
            }
        };

        match remaining.get_mut(&event.doc_id) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                remaining.remove(&event.doc_id);
            }
            None => {
                return Err(HarnessError::UnexpectedUpdate {
                    node,
                    doc_id: event.doc_id,
                });
            }
        }
        update_network_state(state, node, &event);
    }
    Ok(())
}

/// Applies a write's update event: the writer holds the new head, and every
/// node that will receive it is expected to reach it.
pub fn update_network_state(state: &mut State, node: usize, event: &UpdateEvent) {
    let collection = state.collection_index_by_root(event.collection_root);
    let doc_index = state.doc_index(&event.doc_id);
    let doc_id = &event.doc_id;

    let Some(writer) = state.nodes.get_mut(node) else {
        return;
    };
    writer.p2p.actual_heads.insert(
        doc_id.clone(),
        DocHeadState {
            cid: event.cid,
            decrypted: true,
        },
    );
    let replicators = writer.p2p.replicators.clone();
    let connections = writer.p2p.connections.clone();

    for target in replicators {
        if let Some(peer) = state.nodes.get_mut(target) {
            peer.p2p.expected_heads.insert(doc_id.clone(), event.cid);
        }
    }

    for target in connections {
        let Some(peer) = state.nodes.get_mut(target) else {
            continue;
        };
        let p2p = &mut peer.p2p;
        let holds_doc = p2p.actual_heads.contains_key(doc_id);
        let subscribed_collection = collection.is_some_and(|c| p2p.peer_collections.contains(&c));
        let subscribed_doc =
            doc_index.is_some_and(|i: ColDocIndex| p2p.peer_documents.contains(&i));
        if holds_doc || subscribed_collection || subscribed_doc {
            p2p.expected_heads.insert(doc_id.clone(), event.cid);
        }
    }
    debug!("Node {} wrote {} at {}", node, doc_id, event.cid);
}

/// Waits until replication from `source` to `target` has caught up, then
/// records the link and everything the target is now expected to hold.
pub async fn wait_for_replicator_event(
    state: &mut State,
    source: usize,
    target: usize,
) -> HarnessResult<()> {
    let event_timeout = state.config.event_timeout;
    loop {
        let subscription = &mut state.node_mut(source)?.event.replicator;
        match timeout(event_timeout, subscription.recv()).await {
            Ok(Some(NodeEvent::ReplicatorCompleted(_))) => break,
            Ok(Some(_)) => continue,
            Ok(None) => {
                return Err(HarnessError::EventChannelClosed {
                    node: source,
                    topic: EventTopic::ReplicatorCompleted,
                });
            }
            Err(_) => {
                return Err(HarnessError::EventTimeout {
                    node: source,
                    topic: EventTopic::ReplicatorCompleted,
                });
            }
        }
    }

    let heads: Vec<(DocId, Cid)> = state
        .node(source)?
        .p2p
        .actual_heads
        .iter()
        .map(|(doc_id, head)| (doc_id.clone(), head.cid))
        .collect();
    let target_p2p = &mut state.node_mut(target)?.p2p;
    target_p2p.expected_heads.extend(heads);
    target_p2p.connections.insert(source);

    let source_p2p = &mut state.node_mut(source)?.p2p;
    source_p2p.connections.insert(target);
    source_p2p.replicators.insert(target);
    debug!("Replicator {} -> {} caught up", source, target);
    Ok(())
}

/// Docs still to converge on each open node.
fn pending_heads(state: &State, decrypted: bool) -> HashMap<usize, HashMap<DocId, Cid>> {
    let mut pending = HashMap::new();
    for (index, node) in state.nodes.iter().enumerate() {
        if node.closed {
            continue;
        }
        let docs: HashMap<DocId, Cid> = node
            .p2p
            .expected_heads
            .iter()
            .filter(|(doc_id, expected)| match node.p2p.actual_heads.get(*doc_id) {
                Some(head) => head.cid != **expected || (decrypted && !head.decrypted),
                None => true,
            })
            .map(|(doc_id, cid)| (doc_id.clone(), *cid))
            .collect();
        if !docs.is_empty() {
            pending.insert(index, docs);
        }
    }
    pending
}

/// Blocks until every open node has merged the heads it is expected to
/// hold. With `decrypted`, heads must also have been decrypted.
///
/// Merge events from all nodes are awaited together against a single
/// deadline. Merges of documents nobody waits for still update the
/// observed heads.
pub async fn wait_for_sync(state: &mut State, decrypted: bool) -> HarnessResult<()> {
    let mut pending = pending_heads(state, decrypted);
    let deadline = Instant::now() + state.config.sync_timeout;
    debug!("Waiting for {} node(s) to sync", pending.len());

    while !pending.is_empty() {
        let next = {
            let waiters: Vec<_> = state
                .nodes
                .iter_mut()
                .enumerate()
                .filter(|(index, _)| pending.contains_key(index))
                .map(|(index, node)| {
                    Box::pin(async move { (index, node.event.merge.recv().await) })
                })
                .collect();
            match timeout_at(deadline, select_all(waiters)).await {
                Ok(((node, event), _, _)) => Some((node, event)),
                Err(_) => None,
            }
        };
        let Some((node, event)) = next else {
            return Err(HarnessError::SyncTimeout(mismatch_report(state, &pending)));
        };

        let merge = match event {
            Some(NodeEvent::MergeComplete(merge)) => merge,
            Some(_) => continue,
            None => {
                return Err(HarnessError::EventChannelClosed {
                    node,
                    topic: EventTopic::MergeComplete,
                });
            }
        };

        if let Some(docs) = pending.get_mut(&node) {
            let done = docs
                .get(&merge.doc_id)
                .is_some_and(|expected| *expected == merge.cid && (!decrypted || merge.decrypted));
            if done {
                docs.remove(&merge.doc_id);
                if docs.is_empty() {
                    pending.remove(&node);
                }
            }
        }
        state.node_mut(node)?.p2p.actual_heads.insert(
            merge.doc_id.clone(),
            DocHeadState {
                cid: merge.cid,
                decrypted: merge.decrypted,
            },
        );
        debug!("Node {} merged {} at {}", node, merge.doc_id, merge.cid);
    }
    Ok(())
}

fn mismatch_report(state: &State, pending: &HashMap<usize, HashMap<DocId, Cid>>) -> SyncMismatchReport {
    let mut nodes: Vec<NodeMismatch> = pending
        .iter()
        .map(|(&node, docs)| {
            let actual_heads = state.nodes.get(node).map(|n| &n.p2p.actual_heads);
            let mut docs: Vec<DocMismatch> = docs
                .iter()
                .map(|(doc_id, expected)| {
                    let actual = actual_heads.and_then(|heads| heads.get(doc_id));
                    DocMismatch {
                        doc_id: doc_id.clone(),
                        expected: *expected,
                        actual: actual.map(|h| h.cid),
                        decrypted: actual.map(|h| h.decrypted),
                    }
                })
                .collect();
            docs.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
            NodeMismatch { node, docs }
        })
        .collect();
    nodes.sort_by_key(|n| n.node);
    SyncMismatchReport { nodes }
}
