//! Access control: document policies and admin access control.
//!
//! Document ACP gates reads and writes of documents in policy-bound
//! collections. The creator of a document owns it and may grant `reader`
//! or `writer` relations to other actors, or to every actor through `"*"`.
//!
//! Admin ACP gates the node's mutating operations behind one administrator
//! identity and can be temporarily disabled and re-enabled.

use crate::error::{NodeError, NodeResult};
use meshtest_identity::public_key_from_did;
use meshtest_types::DocId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// Actor marker granting a relation to everyone.
pub const ALL_ACTORS: &str = "*";

/// Relations that can be granted on a document.
pub const RELATIONS: [&str; 2] = ["reader", "writer"];

/// A document access policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    /// Resource names collections can bind to.
    pub resources: Vec<String>,
    /// DID of the identity that added the policy.
    #[serde(default)]
    pub creator: String,
}

impl Policy {
    /// Parses a policy document and records its creator.
    pub(crate) fn parse(input: &str, creator: &str) -> NodeResult<Self> {
        let mut policy: Policy =
            serde_json::from_str(input).map_err(|e| NodeError::InvalidPolicy(e.to_string()))?;
        if policy.resources.is_empty() {
            return Err(NodeError::InvalidPolicy("policy defines no resources".into()));
        }
        policy.creator = creator.to_string();
        Ok(policy)
    }

    /// Content-derived policy ID.
    pub(crate) fn id(&self) -> NodeResult<String> {
        Ok(hex::encode(Sha256::digest(serde_json::to_vec(self)?)))
    }
}

/// One granted relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub doc_id: DocId,
    pub relation: String,
    pub actor: String,
}

/// Relationship store for document ACP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentAcp {
    relationships: BTreeSet<Relationship>,
}

impl DocumentAcp {
    /// Adds a relation. Returns true if it already existed.
    pub fn add(&mut self, doc_id: &DocId, relation: &str, actor: &str) -> NodeResult<bool> {
        let relationship = Self::relationship(doc_id, relation, actor)?;
        Ok(!self.relationships.insert(relationship))
    }

    /// Removes a relation. Returns true if it was present.
    pub fn remove(&mut self, doc_id: &DocId, relation: &str, actor: &str) -> NodeResult<bool> {
        let relationship = Self::relationship(doc_id, relation, actor)?;
        Ok(self.relationships.remove(&relationship))
    }

    fn relationship(doc_id: &DocId, relation: &str, actor: &str) -> NodeResult<Relationship> {
        if !RELATIONS.contains(&relation) {
            return Err(NodeError::RelationNotFound(relation.to_string()));
        }
        if actor != ALL_ACTORS {
            public_key_from_did(actor).map_err(|_| NodeError::InvalidActor(actor.to_string()))?;
        }
        Ok(Relationship {
            doc_id: doc_id.clone(),
            relation: relation.to_string(),
            actor: actor.to_string(),
        })
    }

    fn granted(&self, doc_id: &DocId, relations: &[&str], actor: Option<&str>) -> bool {
        self.relationships.iter().any(|r| {
            &r.doc_id == doc_id
                && relations.contains(&r.relation.as_str())
                && (r.actor == ALL_ACTORS || Some(r.actor.as_str()) == actor)
        })
    }

    /// Whether `actor` may read a document owned by `owner`.
    pub fn can_read(&self, doc_id: &DocId, owner: Option<&str>, actor: Option<&str>) -> bool {
        owner.is_none() || owner == actor || self.granted(doc_id, &["reader", "writer"], actor)
    }

    /// Whether `actor` may update or delete a document owned by `owner`.
    pub fn can_write(&self, doc_id: &DocId, owner: Option<&str>, actor: Option<&str>) -> bool {
        owner.is_none() || owner == actor || self.granted(doc_id, &["writer"], actor)
    }
}

/// Admin ACP state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AacStatus {
    #[default]
    NotConfigured,
    Enabled,
    DisabledTemporarily,
}

impl fmt::Display for AacStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AacStatus::NotConfigured => "not-configured",
            AacStatus::Enabled => "enabled",
            AacStatus::DisabledTemporarily => "disabled-temporarily",
        })
    }
}

/// Admin access control.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminAcp {
    status: AacStatus,
    admin: Option<String>,
}

impl AdminAcp {
    pub fn status(&self) -> AacStatus {
        self.status
    }

    /// Enables admin ACP for `admin` unless it is already configured.
    pub fn configure(&mut self, admin: &str) {
        if self.status == AacStatus::NotConfigured {
            self.status = AacStatus::Enabled;
            self.admin = Some(admin.to_string());
        }
    }

    fn is_admin(&self, actor: Option<&str>) -> bool {
        actor.is_some() && self.admin.as_deref() == actor
    }

    /// Rejects `actor` if admin ACP is enabled and they are not the admin.
    pub fn check(&self, actor: Option<&str>) -> NodeResult<()> {
        if self.status == AacStatus::Enabled && !self.is_admin(actor) {
            return Err(NodeError::NotAuthorized);
        }
        Ok(())
    }

    pub fn disable(&mut self, actor: Option<&str>) -> NodeResult<()> {
        match self.status {
            AacStatus::NotConfigured => Err(NodeError::AacNotConfigured),
            AacStatus::DisabledTemporarily => Err(NodeError::AacAlreadyDisabled),
            AacStatus::Enabled if !self.is_admin(actor) => Err(NodeError::NotAuthorized),
            AacStatus::Enabled => {
                self.status = AacStatus::DisabledTemporarily;
                Ok(())
            }
        }
    }

    /// Re-enables admin ACP. The admin re-enabling an enabled system is a no-op.
    pub fn re_enable(&mut self, actor: Option<&str>) -> NodeResult<()> {
        match self.status {
            AacStatus::NotConfigured => Err(NodeError::AacNotConfigured),
            AacStatus::Enabled if self.is_admin(actor) => Ok(()),
            AacStatus::Enabled => Err(NodeError::AacAlreadyEnabled),
            AacStatus::DisabledTemporarily if !self.is_admin(actor) => {
                Err(NodeError::NotAuthorized)
            }
            AacStatus::DisabledTemporarily => {
                self.status = AacStatus::Enabled;
                Ok(())
            }
        }
    }
}
