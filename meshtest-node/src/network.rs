//! In-process network hub.
//!
//! Tracks running nodes by peer ID and keeps memory datastores alive across
//! restarts. Nodes hold only a weak reference back to the hub.

use crate::client::{Client, NodeFactory};
use crate::config::{DatabaseType, NodeOptions};
use crate::db::Database;
use crate::error::{NodeError, NodeResult};
use crate::node::SimNode;
use async_trait::async_trait;
use meshtest_types::PeerId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// File a file-backed node snapshots its datastore to.
pub const DATASTORE_FILE: &str = "datastore.json";

#[derive(Debug, Default)]
pub(crate) struct NetworkInner {
    running: Mutex<HashMap<PeerId, Arc<SimNode>>>,
    memory_stores: Mutex<HashMap<PeerId, Arc<Mutex<Database>>>>,
}

impl NetworkInner {
    pub(crate) fn node(&self, peer_id: &PeerId) -> Option<Arc<SimNode>> {
        self.running.lock().get(peer_id).cloned()
    }

    pub(crate) fn running_nodes(&self) -> Vec<Arc<SimNode>> {
        self.running.lock().values().cloned().collect()
    }

    pub(crate) fn remove(&self, peer_id: &PeerId) {
        self.running.lock().remove(peer_id);
    }
}

/// A set of in-process nodes that can reach each other.
#[derive(Debug, Clone, Default)]
pub struct SimNetwork {
    inner: Arc<NetworkInner>,
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a node. Must be called from within a tokio runtime.
    pub async fn start(&self, options: NodeOptions) -> NodeResult<Arc<SimNode>> {
        options.validate()?;
        let peer_id = options.peer_id.unwrap_or_default();
        if self.inner.running.lock().contains_key(&peer_id) {
            return Err(NodeError::InvalidOptions(format!("peer {peer_id} is already running")));
        }

        let db = match options.database {
            DatabaseType::Memory => self
                .inner
                .memory_stores
                .lock()
                .entry(peer_id)
                .or_default()
                .clone(),
            DatabaseType::File => {
                let dir = options
                    .root_dir
                    .as_deref()
                    .ok_or_else(|| NodeError::InvalidOptions("missing root directory".into()))?;
                Arc::new(Mutex::new(load_snapshot(dir).await?))
            }
        };

        let node = SimNode::spawn(peer_id, options, db, Arc::downgrade(&self.inner));
        self.inner.running.lock().insert(peer_id, node.clone());
        info!("Started node {}", peer_id);
        Ok(node)
    }

    /// Number of running nodes.
    pub fn running_count(&self) -> usize {
        self.inner.running.lock().len()
    }
}

#[async_trait]
impl NodeFactory for SimNetwork {
    async fn start_node(&self, options: NodeOptions) -> NodeResult<Arc<dyn Client>> {
        let node: Arc<dyn Client> = self.start(options).await?;
        Ok(node)
    }
}

async fn load_snapshot(dir: &Path) -> NodeResult<Database> {
    let path = dir.join(DATASTORE_FILE);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Loading datastore from {}", path.display());
            Ok(serde_json::from_slice(&bytes)?)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(dir).await?;
            Ok(Database::default())
        }
        Err(e) => Err(e.into()),
    }
}
