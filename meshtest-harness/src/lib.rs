//! Declarative multi-node test orchestration.
//!
//! A scenario is a [`TestCase`]: a description plus an ordered list of
//! [`Action`]s. The harness starts nodes, runs each action against them,
//! waits for the network to converge after writes, and checks results and
//! errors against what the case expects.
//!
//! # Architecture
//!
//! - **State**: everything a run knows lives in one [`State`], passed by
//!   `&mut` through the pipeline; nodes, collections, documents, policies
//!   and transactions are addressed by creation index
//! - **Identities**: resolved lazily from logical [`IdentityRef`]s and a
//!   seed counter, so reruns reproduce keys and signatures
//! - **Sync**: the harness mirrors the P2P topology it set up and derives
//!   which document heads each node must reach ([`sync`])
//! - **Assertions**: error expectations are symmetric; unexpected errors
//!   abort the case while mismatches are recorded in a [`TestReport`]
//!
//! ```ignore
//! use meshtest_harness::actions::{CreateDoc, Request, SchemaUpdate};
//! use meshtest_harness::{run_test_case, TestCase};
//!
//! run_test_case(
//!     TestCase::new("create and read")
//!         .with_action(SchemaUpdate { schema: "type Users { name: String }".into(), ..Default::default() })
//!         .with_action(CreateDoc { doc: serde_json::json!({"name": "John"}), ..Default::default() })
//!         .with_action(Request { request: "query { Users { name } }".into(), ..Default::default() }),
//! )
//! .await;
//! ```

pub mod action;
pub mod actions;
pub mod assert;
pub mod config;
mod error;
pub mod identity;
pub mod matchers;
pub mod results;
pub mod state;
pub mod sync;
pub mod template;
mod test_case;

pub use action::{Action, Execute, Stateful};
pub use assert::{AssertionFailure, TestReport};
pub use config::{ClientType, HarnessConfig};
pub use error::{DocMismatch, HarnessError, HarnessResult, NodeMismatch, SyncMismatchReport};
pub use identity::{
    all_client_identities, client_identity, no_identity, node_identity, IdentityRef,
};
pub use matchers::{Matcher, NotNull, SameValue, StatefulMatcher, UniqueValue};
pub use results::Expected;
pub use state::{ColDocIndex, State};
pub use test_case::{declared_collection_names, execute_test_case, run_test_case, TestCase};
