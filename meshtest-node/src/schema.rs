//! Collection definitions and the schema definition language.
//!
//! A schema is a list of type declarations:
//!
//! ```text
//! type Users @policy(id: "<policy id>", resource: "users") {
//!     name: String
//!     age: Int
//! }
//! ```
//!
//! Each declared type becomes a collection with a stable root ID. Patches
//! (renames, field additions) create new collection versions under the
//! same root.

use crate::error::{NodeError, NodeResult};
use crate::lexer::{tokenize, Cursor, Token};
use meshtest_types::{CollectionRootId, CollectionVersionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Scalar kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    String,
    Int,
    Float,
    Boolean,
    #[serde(rename = "JSON")]
    Json,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "String",
            FieldKind::Int => "Int",
            FieldKind::Float => "Float",
            FieldKind::Boolean => "Boolean",
            FieldKind::Json => "JSON",
        }
    }

    /// Whether `value` can be stored in a field of this kind. Null always can.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldKind::Float, Value::Number(_)) => true,
            (FieldKind::Boolean, Value::Bool(_)) => true,
            (FieldKind::Json, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "String" => Ok(FieldKind::String),
            "Int" => Ok(FieldKind::Int),
            "Float" => Ok(FieldKind::Float),
            "Boolean" => Ok(FieldKind::Boolean),
            "JSON" => Ok(FieldKind::Json),
            other => Err(NodeError::InvalidSchema(format!("unknown field kind: {other}"))),
        }
    }
}

/// A named, typed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
}

/// Binds a collection to a document access policy resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBinding {
    pub id: String,
    pub resource: String,
}

/// A parsed `type` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    pub policy: Option<PolicyBinding>,
}

impl TypeDefinition {
    /// Root for the collection this definition creates. `attempt` is bumped
    /// while the derived root is already taken on the node.
    pub(crate) fn root_id(&self, attempt: u32) -> NodeResult<CollectionRootId> {
        let canonical = serde_json::to_vec(&serde_json::json!({
            "name": self.name,
            "fields": self.fields,
            "attempt": attempt,
        }))?;
        Ok(CollectionRootId::derive(&canonical))
    }
}

/// The current version of a collection, with its version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescription {
    pub name: String,
    pub root_id: CollectionRootId,
    pub version_id: CollectionVersionId,
    /// Earlier versions, oldest first.
    pub previous_versions: Vec<CollectionVersionId>,
    pub fields: Vec<FieldDefinition>,
    pub policy: Option<PolicyBinding>,
}

impl CollectionDescription {
    pub(crate) fn new(root_id: CollectionRootId, def: TypeDefinition) -> NodeResult<Self> {
        let mut description = Self {
            name: def.name,
            root_id,
            version_id: CollectionVersionId::derive(&[]),
            previous_versions: Vec::new(),
            fields: def.fields,
            policy: def.policy,
        };
        description.version_id = description.derive_version()?;
        Ok(description)
    }

    /// Every version of this collection, oldest first.
    pub fn versions(&self) -> Vec<&CollectionVersionId> {
        self.previous_versions
            .iter()
            .chain(std::iter::once(&self.version_id))
            .collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Records a new version after the definition changed.
    pub(crate) fn bump_version(&mut self) -> NodeResult<()> {
        let next = self.derive_version()?;
        let previous = std::mem::replace(&mut self.version_id, next);
        self.previous_versions.push(previous);
        Ok(())
    }

    fn derive_version(&self) -> NodeResult<CollectionVersionId> {
        let canonical = serde_json::to_vec(&serde_json::json!({
            "name": self.name,
            "root": self.root_id,
            "fields": self.fields,
            "policy": self.policy,
            "previous": self.previous_versions,
        }))?;
        Ok(CollectionVersionId::derive(&canonical))
    }
}

/// One step of a collection patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CollectionPatch {
    Rename { collection: String, name: String },
    AddField { collection: String, field: FieldDefinition },
}

impl CollectionPatch {
    pub fn collection(&self) -> &str {
        match self {
            CollectionPatch::Rename { collection, .. } => collection,
            CollectionPatch::AddField { collection, .. } => collection,
        }
    }
}

/// Parses a JSON array of patch operations.
pub fn parse_patch(input: &str) -> NodeResult<Vec<CollectionPatch>> {
    serde_json::from_str(input).map_err(|e| NodeError::InvalidPatch(e.to_string()))
}

/// Parses schema definition text into type declarations.
pub fn parse_sdl(input: &str) -> NodeResult<Vec<TypeDefinition>> {
    let tokens = tokenize(input).map_err(NodeError::InvalidSchema)?;
    let mut cursor = Cursor::new(tokens);
    let mut types = Vec::new();

    while !cursor.at_end() {
        types.push(parse_type(&mut cursor).map_err(NodeError::InvalidSchema)?);
    }
    if types.is_empty() {
        return Err(NodeError::InvalidSchema("no types defined".into()));
    }
    Ok(types)
}

fn parse_type(cursor: &mut Cursor) -> Result<TypeDefinition, String> {
    let keyword = cursor.name()?;
    if keyword != "type" {
        return Err(format!("expected `type`, found {keyword}"));
    }
    let name = cursor.name()?;

    let mut policy = None;
    while cursor.eat(&Token::At) {
        let directive = cursor.name()?;
        let args = parse_args(cursor)?;
        if directive != "policy" {
            return Err(format!("unknown directive @{directive}"));
        }
        let arg = |key: &str| {
            args.iter()
                .find(|(k, _)| k == key)
                .and_then(|(_, v)| v.as_str().map(str::to_string))
                .ok_or_else(|| format!("@policy requires a string `{key}`"))
        };
        policy = Some(PolicyBinding {
            id: arg("id")?,
            resource: arg("resource")?,
        });
    }

    cursor.expect(Token::LBrace)?;
    let mut fields: Vec<FieldDefinition> = Vec::new();
    while !cursor.eat(&Token::RBrace) {
        let field = cursor.name()?;
        cursor.expect(Token::Colon)?;
        let kind: FieldKind = cursor.name()?.parse().map_err(|e: NodeError| e.to_string())?;
        cursor.eat(&Token::Bang);
        if fields.iter().any(|f| f.name == field) {
            return Err(format!("duplicate field {field} in {name}"));
        }
        fields.push(FieldDefinition { name: field, kind });
    }
    Ok(TypeDefinition {
        name,
        fields,
        policy,
    })
}

/// Parses `(key: value ...)` if present.
pub(crate) fn parse_args(cursor: &mut Cursor) -> Result<Vec<(String, Value)>, String> {
    let mut args = Vec::new();
    if !cursor.eat(&Token::LParen) {
        return Ok(args);
    }
    while !cursor.eat(&Token::RParen) {
        let key = cursor.name()?;
        cursor.expect(Token::Colon)?;
        args.push((key, cursor.value()?));
    }
    Ok(args)
}
