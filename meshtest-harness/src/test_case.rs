//! Test case execution.
//!
//! A [`TestCase`] runs once per selector combination: every configured
//! database type the case supports, times every KMS type it asks for. Each
//! run gets a fresh network and a fresh [`State`].

use crate::action::Action;
use crate::actions::{close_nodes, start_node, StartNode};
use crate::assert::TestReport;
use crate::config::HarnessConfig;
use crate::error::HarnessResult;
use crate::identity::IdentityRef;
use crate::state::{RunSelectors, State};
use meshtest_identity::KeyType;
use meshtest_node::{DatabaseType, KmsType, NodeFactory, SimNetwork};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A declarative multi-node scenario.
#[derive(Debug, Clone, Default)]
pub struct TestCase {
    pub description: String,
    pub actions: Vec<Action>,
    /// Key types of specific identities; the rest use secp256k1.
    pub identity_types: HashMap<IdentityRef, KeyType>,
    /// Database types the case can run on; `None` means all of them.
    pub supported_database_types: Option<Vec<DatabaseType>>,
    /// KMS types to run with. `None` runs without a KMS.
    pub kms: Option<Vec<KmsType>>,
}

impl TestCase {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    /// Appends an action.
    pub fn with_action(mut self, action: impl Into<Action>) -> Self {
        self.actions.push(action.into());
        self
    }

    fn uses_network(&self) -> bool {
        self.actions.iter().any(Action::uses_network)
    }

    fn starts_nodes(&self) -> bool {
        self.actions.iter().any(|a| matches!(a, Action::StartNode(_)))
    }

    fn selector_runs(&self, config: &HarnessConfig) -> Vec<RunSelectors> {
        let databases = config.database_types.iter().copied().filter(|db| {
            self.supported_database_types
                .as_ref()
                .is_none_or(|supported| supported.contains(db))
        });
        let kms_types: Vec<KmsType> = match (&self.kms, config.kms_type) {
            (None, _) => vec![KmsType::None],
            (Some(kms), None) => kms.clone(),
            (Some(kms), Some(only)) => kms.iter().copied().filter(|k| *k == only).collect(),
        };
        databases
            .flat_map(|database| {
                kms_types.iter().map(move |&kms| RunSelectors {
                    database,
                    kms,
                    client: config.client_type,
                })
            })
            .collect()
    }
}

/// Collection names declared by the case's schema updates, in order.
///
/// These fix the collection indexes before any node exists, so actions can
/// address collections that only some nodes have.
pub fn declared_collection_names(actions: &[Action]) -> Vec<String> {
    let mut names = Vec::new();
    for action in actions {
        let Action::SchemaUpdate(update) = action else {
            continue;
        };
        let mut tokens = update.schema.split_whitespace();
        while let Some(token) = tokens.next() {
            if token != "type" {
                continue;
            }
            let Some(name) = tokens.next() else {
                break;
            };
            let name = name
                .split(|c: char| c == '{' || c == '@')
                .next()
                .unwrap_or_default();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Runs a case under every applicable selector combination.
///
/// Fatal errors abort the case and are returned; soft assertion failures
/// are collected in the report.
pub async fn execute_test_case(case: &TestCase, config: &HarnessConfig) -> HarnessResult<TestReport> {
    let mut report = TestReport::new(&case.description);

    if config.skip_network_tests && case.uses_network() {
        info!("Skipping network test case: {}", case.description);
        report.skipped = Some("network tests are disabled".to_string());
        return Ok(report);
    }

    let runs = case.selector_runs(config);
    if runs.is_empty() {
        info!("No supported selectors for test case: {}", case.description);
        report.skipped = Some("no supported database or KMS type configured".to_string());
        return Ok(report);
    }

    for selectors in runs {
        info!(
            "Running test case: {} (database: {}, kms: {}, client: {})",
            case.description, selectors.database, selectors.kms, selectors.client
        );
        let network: Arc<dyn NodeFactory> = Arc::new(SimNetwork::new());
        let mut state = State::new(
            config.clone(),
            selectors,
            network,
            declared_collection_names(&case.actions),
        );
        state.report = TestReport::new(&case.description);
        state.identity_types = case.identity_types.clone();
        state.is_network_enabled = case.uses_network();

        let result = run_actions(case, &mut state).await;

        if let Err(e) = close_nodes(&mut state).await {
            warn!("Failed to close nodes: {}", e);
        }
        state.reset_matchers();
        result?;

        state.report.runs = 1;
        report.merge(state.report);
    }
    Ok(report)
}

async fn run_actions(case: &TestCase, state: &mut State) -> HarnessResult<()> {
    if !case.starts_nodes() {
        start_node(state, &StartNode::default()).await?;
    }
    for (index, action) in case.actions.iter().enumerate() {
        state.current_action = index;
        debug!("Executing action {}: {}", index, action.name());
        action
            .perform(state)
            .await
            .map_err(|e| e.in_action(index, action.name()))?;
    }
    Ok(())
}

/// Runs a case with the configuration from the environment and panics on
/// any failure. Meant to be called from `#[tokio::test]` functions.
pub async fn run_test_case(case: TestCase) {
    let config = match HarnessConfig::from_env() {
        Ok(config) => config,
        Err(e) => panic!("invalid harness configuration: {e}"),
    };
    match execute_test_case(&case, &config).await {
        Ok(report) if report.is_success() => {}
        Ok(report) => {
            let failures: Vec<String> = report.failures.iter().map(ToString::to_string).collect();
            panic!("{} assertion(s) failed:\n{}", failures.len(), failures.join("\n"));
        }
        Err(e) => panic!("{}: {e}", case.description),
    }
}
