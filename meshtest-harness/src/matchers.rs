//! Value matchers for request results.
//!
//! A [`Matcher`] checks a single value. A [`StatefulMatcher`] also remembers
//! what it has seen across calls, so a test can assert that a value is
//! unique, or the same, everywhere it appears in a run. The harness resets
//! stateful matchers after each run.

use crate::config::ClientType;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Where a value is being matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchContext {
    pub node_id: usize,
    pub client_type: ClientType,
}

/// Checks one value, returning a failure message on mismatch.
pub trait Matcher: Send + Sync + fmt::Debug {
    fn matches(&self, actual: &Value, ctx: &MatchContext) -> Result<(), String>;
}

/// A matcher whose memory must be cleared between runs.
///
/// [`Matcher::matches`] records the value; [`StatefulMatcher::check`] only
/// reports whether `matches` would accept it.
pub trait StatefulMatcher: Matcher {
    fn check(&self, actual: &Value, ctx: &MatchContext) -> Result<(), String>;

    fn reset_matcher_state(&self);
}

/// Matches any non-null value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotNull;

impl Matcher for NotNull {
    fn matches(&self, actual: &Value, _ctx: &MatchContext) -> Result<(), String> {
        if actual.is_null() {
            return Err("expected a value, got null".into());
        }
        Ok(())
    }
}

/// Matches values never seen before on the same node.
///
/// The same block seen on two nodes has the same CID, so uniqueness is
/// tracked per node.
#[derive(Debug, Default)]
pub struct UniqueValue {
    seen: Mutex<HashMap<usize, HashSet<String>>>,
}

impl UniqueValue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Matcher for UniqueValue {
    fn matches(&self, actual: &Value, ctx: &MatchContext) -> Result<(), String> {
        let key = actual.to_string();
        let mut seen = self.seen.lock();
        if !seen.entry(ctx.node_id).or_default().insert(key) {
            return Err(format!("value {actual} was already seen on node {}", ctx.node_id));
        }
        Ok(())
    }
}

impl StatefulMatcher for UniqueValue {
    fn check(&self, actual: &Value, ctx: &MatchContext) -> Result<(), String> {
        let seen = self.seen.lock();
        if seen
            .get(&ctx.node_id)
            .is_some_and(|values| values.contains(&actual.to_string()))
        {
            return Err(format!("value {actual} was already seen on node {}", ctx.node_id));
        }
        Ok(())
    }

    fn reset_matcher_state(&self) {
        self.seen.lock().clear();
    }
}

/// Matches the value it first saw, everywhere it is used.
#[derive(Debug, Default)]
pub struct SameValue {
    first: Mutex<Option<Value>>,
}

impl SameValue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Matcher for SameValue {
    fn matches(&self, actual: &Value, _ctx: &MatchContext) -> Result<(), String> {
        let mut first = self.first.lock();
        match first.as_ref() {
            None => {
                *first = Some(actual.clone());
                Ok(())
            }
            Some(expected) if expected == actual => Ok(()),
            Some(expected) => Err(format!("expected the same value {expected}, got {actual}")),
        }
    }
}

impl StatefulMatcher for SameValue {
    fn check(&self, actual: &Value, _ctx: &MatchContext) -> Result<(), String> {
        match self.first.lock().as_ref() {
            Some(expected) if expected != actual => {
                Err(format!("expected the same value {expected}, got {actual}"))
            }
            _ => Ok(()),
        }
    }

    fn reset_matcher_state(&self) {
        self.first.lock().take();
    }
}
