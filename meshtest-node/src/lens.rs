//! Lens migrations between collection versions.
//!
//! A migration is a list of field transforms registered for a source and a
//! destination version. Documents last written at the source version are
//! transformed when read through a later version.

use meshtest_types::{CollectionRootId, CollectionVersionId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One field transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LensOp {
    /// Sets `field` to `value` when it is missing or null.
    SetDefault { field: String, value: Value },
    /// Copies `from` into `to`.
    CopyField { from: String, to: String },
    RemoveField { field: String },
}

impl LensOp {
    fn apply(&self, fields: &mut Map<String, Value>) {
        match self {
            LensOp::SetDefault { field, value } => {
                let slot = fields.entry(field.clone()).or_insert(Value::Null);
                if slot.is_null() {
                    *slot = value.clone();
                }
            }
            LensOp::CopyField { from, to } => {
                if let Some(v) = fields.get(from).cloned() {
                    fields.insert(to.clone(), v);
                }
            }
            LensOp::RemoveField { field } => {
                fields.remove(field);
            }
        }
    }
}

/// A migration as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LensConfig {
    pub collection: String,
    pub source_version: CollectionVersionId,
    pub destination_version: CollectionVersionId,
    pub ops: Vec<LensOp>,
}

/// A registered migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub collection_root: CollectionRootId,
    pub source_version: CollectionVersionId,
    pub destination_version: CollectionVersionId,
    pub ops: Vec<LensOp>,
}

/// Walks registered migrations from `from` towards `to`, applying each hop.
pub(crate) fn migrate(
    migrations: &[Migration],
    root: CollectionRootId,
    from: &CollectionVersionId,
    to: &CollectionVersionId,
    fields: &mut Map<String, Value>,
) {
    let mut current = from.clone();
    // Each hop consumes one migration, which bounds the walk.
    for _ in 0..migrations.len() {
        if &current == to {
            return;
        }
        let Some(step) = migrations
            .iter()
            .find(|m| m.collection_root == root && m.source_version == current)
        else {
            return;
        };
        for op in &step.ops {
            op.apply(fields);
        }
        current = step.destination_version.clone();
    }
}
