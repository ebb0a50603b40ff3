//! Read requests.
//!
//! A request selects documents from one or more collections:
//!
//! ```text
//! query {
//!     Users(docID: "bae-...") {
//!         _docID
//!         name
//!     }
//! }
//! ```
//!
//! `docID` accepts one ID or a list. `_docID`, `_head` and `_version` select
//! document metadata; any other name selects a field.

use crate::error::{NodeError, NodeResult};
use crate::lexer::{tokenize, Cursor, Token};
use crate::schema::parse_args;
use serde_json::Value;

/// One top-level collection selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub collection: String,
    pub doc_ids: Option<Vec<String>>,
    pub fields: Vec<String>,
}

/// Parses a request into its collection selections.
pub fn parse_request(input: &str) -> NodeResult<Vec<Selection>> {
    let tokens = tokenize(input).map_err(NodeError::InvalidRequest)?;
    let mut cursor = Cursor::new(tokens);
    parse(&mut cursor).map_err(NodeError::InvalidRequest)
}

fn parse(cursor: &mut Cursor) -> Result<Vec<Selection>, String> {
    if let Some(Token::Name(keyword)) = cursor.peek() {
        if keyword != "query" {
            return Err(format!("unsupported operation: {keyword}"));
        }
        cursor.advance();
    }
    cursor.expect(Token::LBrace)?;

    let mut selections = Vec::new();
    while !cursor.eat(&Token::RBrace) {
        selections.push(parse_selection(cursor)?);
    }
    if !cursor.at_end() {
        return Err("unexpected input after request".into());
    }
    if selections.is_empty() {
        return Err("empty request".into());
    }
    Ok(selections)
}

fn parse_selection(cursor: &mut Cursor) -> Result<Selection, String> {
    let collection = cursor.name()?;
    let mut doc_ids = None;
    for (key, value) in parse_args(cursor)? {
        match (key.as_str(), value) {
            ("docID", Value::String(id)) => doc_ids = Some(vec![id]),
            ("docID", Value::Array(ids)) => {
                doc_ids = Some(
                    ids.into_iter()
                        .map(|v| match v {
                            Value::String(s) => Ok(s),
                            other => Err(format!("docID must be a string, found {other}")),
                        })
                        .collect::<Result<_, _>>()?,
                );
            }
            (other, _) => return Err(format!("unsupported argument: {other}")),
        }
    }

    cursor.expect(Token::LBrace)?;
    let mut fields = Vec::new();
    while !cursor.eat(&Token::RBrace) {
        fields.push(cursor.name()?);
    }
    if fields.is_empty() {
        return Err(format!("no fields selected for {collection}"));
    }
    Ok(Selection {
        collection,
        doc_ids,
        fields,
    })
}
