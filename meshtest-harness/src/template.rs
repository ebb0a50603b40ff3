//! Template substitution.
//!
//! Strings in actions may contain `{{.Key}}` placeholders for values only
//! known once earlier actions have run against a node, such as the ID of
//! the first policy added there (`{{.Policy0}}`). Placeholders are resolved
//! per node, at execution time.

use crate::error::{HarnessError, HarnessResult};
use crate::state::State;
use std::collections::HashMap;

/// Produces template values for one node.
type Generator = fn(&State, usize) -> HashMap<String, String>;

const GENERATORS: &[Generator] = &[policy_ids];

/// `Policy0`, `Policy1`, ... in the order policies were added to the node.
fn policy_ids(state: &State, node: usize) -> HashMap<String, String> {
    state
        .policy_ids
        .get(node)
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(i, id)| (format!("Policy{i}"), id.clone()))
        .collect()
}

/// Replaces every placeholder in `input` with its value for `node`.
///
/// Input without `{{` is returned unchanged.
pub fn replace(state: &State, node: usize, input: &str) -> HarnessResult<String> {
    if !input.contains("{{") {
        return Ok(input.to_string());
    }

    let mut data = HashMap::new();
    for generate in GENERATORS {
        data.extend(generate(state, node));
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| HarnessError::Template(format!("unclosed action in {input:?}")))?;
        let key = parse_key(after[..end].trim())?;
        let value = data.get(key).ok_or_else(|| {
            HarnessError::Template(format!("no value for key {key:?} on node {node}"))
        })?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn parse_key(action: &str) -> HarnessResult<&str> {
    let key = action
        .strip_prefix('.')
        .ok_or_else(|| HarnessError::Template(format!("unsupported action {{{{{action}}}}}")))?;
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(HarnessError::Template(format!("invalid key {key:?}")));
    }
    Ok(key)
}
