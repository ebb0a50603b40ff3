//! Identity resolution.
//!
//! Actions refer to identities by [`IdentityRef`], never by key. The first
//! time a reference is resolved a key is generated from the run's seed
//! counter; every later resolution returns the cached holder. Replaying a
//! case therefore reproduces the same keys, DIDs and signatures.

use crate::error::{HarnessError, HarnessResult};
use crate::state::State;
use chrono::Duration;
use meshtest_identity::{generate_private_key, Identity};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Lifetime of bearer tokens issued to identities.
const TOKEN_TTL_MINUTES: i64 = 60;

/// Whose identity a reference names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKind {
    /// A user calling into nodes.
    Client,
    /// A node's own identity.
    Node,
}

/// Which identity of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Selector {
    Index(usize),
    /// Every actor. Only meaningful as a relationship target.
    All,
}

/// A logical reference to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityRef {
    pub kind: IdentityKind,
    pub selector: Selector,
}

impl fmt::Display for IdentityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            IdentityKind::Client => "client",
            IdentityKind::Node => "node",
        };
        match self.selector {
            Selector::Index(i) => write!(f, "{kind}:{i}"),
            Selector::All => write!(f, "{kind}:*"),
        }
    }
}

/// The `index`th client identity.
pub fn client_identity(index: usize) -> Option<IdentityRef> {
    Some(IdentityRef {
        kind: IdentityKind::Client,
        selector: Selector::Index(index),
    })
}

/// The identity of node `index`.
pub fn node_identity(index: usize) -> Option<IdentityRef> {
    Some(IdentityRef {
        kind: IdentityKind::Node,
        selector: Selector::Index(index),
    })
}

/// Every client identity, i.e. the `"*"` relationship target.
pub fn all_client_identities() -> Option<IdentityRef> {
    Some(IdentityRef {
        kind: IdentityKind::Client,
        selector: Selector::All,
    })
}

/// No identity: requests are anonymous.
pub fn no_identity() -> Option<IdentityRef> {
    None
}

/// A resolved identity and the tokens issued for it, by node index.
#[derive(Debug, Clone)]
pub struct IdentityHolder {
    pub identity: Identity,
    pub node_tokens: HashMap<usize, String>,
}

impl IdentityHolder {
    fn new(identity: Identity) -> Self {
        Self {
            identity,
            node_tokens: HashMap::new(),
        }
    }
}

impl State {
    /// Resolves a reference to its identity, generating it on first use.
    pub fn get_identity(&mut self, reference: Option<IdentityRef>) -> HarnessResult<Option<Identity>> {
        match reference {
            Some(reference) => Ok(Some(self.get_identity_holder(reference)?.identity.clone())),
            None => Ok(None),
        }
    }

    /// The cached holder of a reference, generated on first use.
    ///
    /// The broadcast selector must be resolved by the caller; reaching this
    /// function with it is an authoring error.
    pub fn get_identity_holder(&mut self, reference: IdentityRef) -> HarnessResult<&mut IdentityHolder> {
        if reference.selector == Selector::All {
            return Err(HarnessError::Identity(format!(
                "{reference} is a broadcast marker and names no single identity"
            )));
        }
        let key_type = self.identity_types.get(&reference).copied().unwrap_or_default();
        let seed = &mut self.next_identity_gen_seed;
        Ok(self.identities.entry(reference).or_insert_with(|| {
            let identity = Identity::from_private_key(generate_private_key(key_type, *seed));
            debug!("Generated identity {} ({}) from seed {}", reference, key_type, *seed);
            *seed += 1;
            IdentityHolder::new(identity)
        }))
    }

    /// The bearer token an identity presents to `node`, issued once per node.
    pub fn identity_for_request(
        &mut self,
        reference: Option<IdentityRef>,
        node: usize,
    ) -> HarnessResult<Option<String>> {
        let Some(reference) = reference else {
            return Ok(None);
        };
        let audience = self.node(node)?.peer_id().to_string();
        let holder = self.get_identity_holder(reference)?;
        if let Some(token) = holder.node_tokens.get(&node) {
            return Ok(Some(token.clone()));
        }
        let token = holder
            .identity
            .issue_token(&audience, Duration::minutes(TOKEN_TTL_MINUTES))?;
        holder.node_tokens.insert(node, token.clone());
        Ok(Some(token))
    }

    /// The DID used as a relationship target. The broadcast selector maps
    /// to `"*"`.
    pub fn identity_did(&mut self, reference: IdentityRef) -> HarnessResult<String> {
        if reference.selector == Selector::All {
            return Ok(meshtest_node::acp::ALL_ACTORS.to_string());
        }
        Ok(self.get_identity_holder(reference)?.identity.did().to_string())
    }

    /// Number of identities generated so far.
    pub fn generated_identity_count(&self) -> u64 {
        self.next_identity_gen_seed
    }
}
