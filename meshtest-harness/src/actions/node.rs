use crate::action::Stateful;
use crate::error::{HarnessError, HarnessResult};
use crate::identity::node_identity;
use crate::state::{EventState, NodeState, State};
use async_trait::async_trait;
use meshtest_node::{DatabaseType, NodeOptions};
use tracing::{debug, info};

/// Starts a new node, or restarts a closed one.
///
/// A case without any `StartNode` gets one default node.
#[derive(Debug, Clone, Default)]
pub struct StartNode {
    /// Restart this closed node instead of adding a new one.
    pub node: Option<usize>,
    /// Enable admin ACP with the node's identity as administrator.
    pub enable_aac: bool,
    /// Sign every block the node creates.
    pub enable_signing: bool,
}

#[async_trait]
impl Stateful for StartNode {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        start_node(state, self).await?;
        Ok(())
    }
}

/// Starts or restarts a node and returns its index.
pub async fn start_node(state: &mut State, action: &StartNode) -> HarnessResult<usize> {
    if let Some(index) = action.node {
        let node = state.node(index)?;
        if !node.closed {
            return Err(HarnessError::InvalidAction(format!("node {index} is already running")));
        }
        let mut options = node.options.clone();
        options.enable_aac = action.enable_aac;
        options.enable_signing = action.enable_signing;
        restart_node(state, index, options).await?;
        state.refresh_collections().await?;
        return Ok(index);
    }

    let index = state.nodes.len();
    let identity = state.get_identity(node_identity(index))?;
    let root_dir = match state.selectors.database {
        DatabaseType::File => Some(state.node_root_dir(index)?),
        DatabaseType::Memory => None,
    };
    let mut options = NodeOptions {
        peer_id: None,
        database: state.selectors.database,
        root_dir,
        kms: state.selectors.kms,
        identity,
        enable_aac: action.enable_aac,
        enable_signing: action.enable_signing,
    };

    let client = state.factory.start_node(options.clone()).await?;
    options.peer_id = Some(client.peer_info().peer_id);
    let node = NodeState::new(client, options)?;
    info!("Started node {} ({})", index, node.peer_id());
    state.nodes.push(node);
    if state.policy_ids.len() < state.nodes.len() {
        state.policy_ids.resize_with(state.nodes.len(), Vec::new);
    }
    state.refresh_collections().await?;
    Ok(index)
}

/// Starts a closed node again on its previous datastore, with fresh event
/// subscriptions. Its P2P state is kept and its connections re-established.
async fn restart_node(state: &mut State, index: usize, options: NodeOptions) -> HarnessResult<()> {
    let client = state.factory.start_node(options.clone()).await?;
    let event = EventState::new(client.events())?;
    let addr = client.peer_info();

    let node = state.node_mut(index)?;
    node.client = client.clone();
    node.event = event;
    node.addr = addr;
    node.options = options;
    node.closed = false;

    let peers: Vec<usize> = node.p2p.connections.iter().copied().collect();
    for peer in peers {
        let peer = state.node(peer)?;
        if !peer.closed {
            client.connect(&peer.addr).await?;
        }
    }
    debug!("Restarted node {}", index);
    Ok(())
}

/// Closes nodes: the given one, or every open node.
#[derive(Debug, Clone, Default)]
pub struct Close {
    pub node: Option<usize>,
}

#[async_trait]
impl Stateful for Close {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        for index in state.node_indices(self.node)? {
            let node = state.node_mut(index)?;
            if node.closed {
                continue;
            }
            node.client.close().await?;
            node.closed = true;
            info!("Closed node {}", index);
        }
        Ok(())
    }
}

/// Closes every node and starts them again on their datastores.
#[derive(Debug, Clone, Copy, Default)]
pub struct Restart;

#[async_trait]
impl Stateful for Restart {
    async fn execute(&self, state: &mut State) -> HarnessResult<()> {
        close_nodes(state).await?;
        // Later nodes first; each restarted node connects to its running peers.
        for index in (0..state.nodes.len()).rev() {
            let options = state.node(index)?.options.clone();
            restart_node(state, index, options).await?;
        }
        state.refresh_collections().await
    }
}

/// Closes every open node.
pub async fn close_nodes(state: &mut State) -> HarnessResult<()> {
    for (index, node) in state.nodes.iter_mut().enumerate() {
        if node.closed {
            continue;
        }
        node.client.close().await?;
        node.closed = true;
        debug!("Closed node {}", index);
    }
    Ok(())
}
