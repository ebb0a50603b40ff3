//! Assertions.
//!
//! Fatal assertions return an error and abort the case. Soft assertions are
//! recorded in the [`TestReport`] and the case carries on, so one run
//! reports every mismatch.

use crate::error::{HarnessError, HarnessResult};
use crate::results::{compare, Expected};
use crate::state::State;
use meshtest_node::NodeError;
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Message recorded when an expected error never happened.
pub const EXPECTED_ERROR_NOT_RAISED: &str = "Expected an error however none was raised.";

/// One soft assertion failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    pub description: String,
    /// Action being executed when the failure was recorded.
    pub action: usize,
    pub message: String,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (action {}): {}", self.description, self.action, self.message)
    }
}

/// Outcome of a test case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    pub description: String,
    pub failures: Vec<AssertionFailure>,
    /// Number of selector combinations the case ran under.
    pub runs: usize,
    /// Why the case did not run, if it was skipped.
    pub skipped: Option<String>,
}

impl TestReport {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, action: usize, message: impl Into<String>) {
        let failure = AssertionFailure {
            description: self.description.clone(),
            action,
            message: message.into(),
        };
        warn!("Assertion failed: {}", failure);
        self.failures.push(failure);
    }

    pub(crate) fn merge(&mut self, other: TestReport) {
        self.failures.extend(other.failures);
        self.runs += other.runs;
    }
}

impl State {
    /// Records a soft assertion failure against the current action.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        let action = self.current_action;
        self.report.record(action, message);
    }
}

/// Checks a node call's error against the expected one.
///
/// Returns whether an error was raised. An error while none was expected is
/// fatal; an error not containing the expected text is a soft failure.
pub fn assert_error(
    state: &mut State,
    error: Option<&NodeError>,
    expected: Option<&str>,
) -> HarnessResult<bool> {
    let Some(error) = error else {
        return Ok(false);
    };
    let Some(expected) = expected.filter(|e| !e.is_empty()) else {
        return Err(HarnessError::UnexpectedError(error.to_string()));
    };
    let actual = error.to_string();
    if !actual.contains(expected) {
        state.record_failure(format!("expected error containing {expected:?}, got {actual:?}"));
    }
    Ok(true)
}

/// Records a soft failure if an error was expected but none was raised.
pub fn assert_expected_error_raised(state: &mut State, expected: Option<&str>, was_raised: bool) {
    if expected.is_some_and(|e| !e.is_empty()) && !was_raised {
        state.record_failure(EXPECTED_ERROR_NOT_RAISED);
    }
}

/// Compares a result against its expected shape, recording a soft failure
/// on mismatch. Stateful matchers in the tree are registered for reset.
pub fn assert_results(state: &mut State, expected: &Expected, actual: &Value) {
    let mut matchers = Vec::new();
    expected.stateful_matchers(&mut matchers);
    for matcher in &matchers {
        state.register_matcher(matcher);
    }
    if let Err(message) = compare(state, expected, actual) {
        state.record_failure(format!("node {}: {message}", state.current_node_id));
    }
}

/// Checks a plain equality, recording a soft failure on mismatch.
pub fn assert_equal<T>(state: &mut State, what: &str, expected: &T, actual: &T)
where
    T: PartialEq + fmt::Debug + ?Sized,
{
    if expected != actual {
        state.record_failure(format!("{what}: expected {expected:?}, got {actual:?}"));
    }
}

