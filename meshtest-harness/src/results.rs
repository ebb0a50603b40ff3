//! Expected result trees.
//!
//! An [`Expected`] describes the shape a request result must have. Leaves
//! are literal values, references to documents the case created, matchers,
//! or alternatives.

use crate::matchers::{MatchContext, Matcher, StatefulMatcher};
use crate::state::State;
use serde_json::Value;
use std::sync::Arc;

/// The expected shape of a value.
#[derive(Debug, Clone)]
pub enum Expected {
    /// Exactly this value.
    Value(Value),
    /// An object with exactly these keys.
    Object(Vec<(String, Expected)>),
    /// An object with at least these keys.
    Contains(Vec<(String, Expected)>),
    /// A list with exactly these elements, in order.
    List(Vec<Expected>),
    /// The ID of document `doc` of collection `col`.
    DocIndex { col: usize, doc: usize },
    /// Any one of the alternatives.
    AnyOf(Vec<Expected>),
    Matcher(Arc<dyn Matcher>),
    Stateful(Arc<dyn StatefulMatcher>),
}

impl Expected {
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Expected)>,
    {
        Expected::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn contains<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Expected)>,
    {
        Expected::Contains(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list<I: IntoIterator<Item = Expected>>(items: I) -> Self {
        Expected::List(items.into_iter().collect())
    }

    pub fn doc_id(col: usize, doc: usize) -> Self {
        Expected::DocIndex { col, doc }
    }

    pub fn matcher(matcher: impl Matcher + 'static) -> Self {
        Expected::Matcher(Arc::new(matcher))
    }

    pub fn stateful(matcher: Arc<dyn StatefulMatcher>) -> Self {
        Expected::Stateful(matcher)
    }

    /// Every stateful matcher in the tree.
    pub(crate) fn stateful_matchers(&self, out: &mut Vec<Arc<dyn StatefulMatcher>>) {
        match self {
            Expected::Object(fields) | Expected::Contains(fields) => {
                fields.iter().for_each(|(_, e)| e.stateful_matchers(out))
            }
            Expected::List(items) | Expected::AnyOf(items) => {
                items.iter().for_each(|e| e.stateful_matchers(out))
            }
            Expected::Stateful(m) => out.push(m.clone()),
            Expected::Value(_) | Expected::DocIndex { .. } | Expected::Matcher(_) => {}
        }
    }
}

impl From<Value> for Expected {
    fn from(value: Value) -> Self {
        Expected::Value(value)
    }
}

/// Compares `actual` against `expected`, returning the first mismatch with
/// its JSON path.
pub fn compare(state: &State, expected: &Expected, actual: &Value) -> Result<(), String> {
    let ctx = MatchContext {
        node_id: state.current_node_id,
        client_type: state.selectors.client,
    };
    compare_at(state, &ctx, Mode::Record, expected, actual, "$")
}

/// Whether stateful matchers remember the values they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Record,
    Check,
}

fn compare_at(
    state: &State,
    ctx: &MatchContext,
    mode: Mode,
    expected: &Expected,
    actual: &Value,
    path: &str,
) -> Result<(), String> {
    match expected {
        Expected::Value(value) => {
            if values_equal(value, actual) {
                Ok(())
            } else {
                Err(format!("{path}: expected {value}, got {actual}"))
            }
        }
        Expected::DocIndex { col, doc } => {
            let doc_id = state.doc_id(*col, *doc).map_err(|e| format!("{path}: {e}"))?;
            match actual.as_str() {
                Some(id) if id == doc_id.as_str() => Ok(()),
                _ => Err(format!("{path}: expected document {doc_id}, got {actual}")),
            }
        }
        Expected::Object(fields) | Expected::Contains(fields) => {
            let Some(object) = actual.as_object() else {
                return Err(format!("{path}: expected an object, got {actual}"));
            };
            if matches!(expected, Expected::Object(_)) && object.len() != fields.len() {
                let keys: Vec<&String> = object.keys().collect();
                return Err(format!(
                    "{path}: expected {} field(s), got {} ({keys:?})",
                    fields.len(),
                    object.len()
                ));
            }
            for (key, field) in fields {
                let value = object
                    .get(key)
                    .ok_or_else(|| format!("{path}: missing field {key:?}"))?;
                compare_at(state, ctx, mode, field, value, &format!("{path}.{key}"))?;
            }
            Ok(())
        }
        Expected::List(items) => {
            let Some(list) = actual.as_array() else {
                return Err(format!("{path}: expected a list, got {actual}"));
            };
            if list.len() != items.len() {
                return Err(format!(
                    "{path}: expected {} item(s), got {}",
                    items.len(),
                    list.len()
                ));
            }
            for (i, (item, value)) in items.iter().zip(list).enumerate() {
                compare_at(state, ctx, mode, item, value, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        Expected::AnyOf(options) => {
            // Rejected alternatives must leave stateful matchers untouched.
            let chosen = options
                .iter()
                .find(|option| compare_at(state, ctx, Mode::Check, option, actual, path).is_ok())
                .ok_or_else(|| {
                    format!("{path}: {actual} matches none of {} alternative(s)", options.len())
                })?;
            match mode {
                Mode::Record => compare_at(state, ctx, mode, chosen, actual, path),
                Mode::Check => Ok(()),
            }
        }
        Expected::Matcher(matcher) => matcher
            .matches(actual, ctx)
            .map_err(|e| format!("{path}: {e}")),
        Expected::Stateful(matcher) => {
            let result = match mode {
                Mode::Record => matcher.matches(actual, ctx),
                Mode::Check => matcher.check(actual, ctx),
            };
            result.map_err(|e| format!("{path}: {e}"))
        }
    }
}

/// JSON equality that treats integers and floats of equal value as equal.
fn values_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => expected == actual,
    }
}
