//! Approval flow engine
//!
//! Drives instances of a published definition graph through human approval
//! steps: submit, approve or reject, urge, recall, postpone and close. Every
//! successful operation appends one immutable entry to the instance's trail;
//! the latest entry is the current state.
//!
//! # Architecture
//!
//! The [`FlowEngine`] composes specialized components:
//!
//! - [`DefinitionRegistry`] — Publishes, versions and caches definition graphs
//! - [`ApprovalResolver`] — Resolves who must act at a node and evaluates AND/OR/SEQUENTIAL consensus
//! - [`Router`] — Follows guarded relations through condition nodes
//! - [`GuardEvaluator`] — Evaluates relation guards against bound data
//! - [`CallbackRegistry`] — Per-node callbacks that may veto an action or attach a message
//! - [`GraphStore`] / [`RecordStore`] — Persistence collaborators
//!
//! # Example
//!
//! ```rust
//! use flow_engine::{FlowEngine, InMemoryDirectory};
//! use flow_types::*;
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let directory = Arc::new(InMemoryDirectory::with_operators([
//!     Operator::new(1, "Author"),
//!     Operator::new(2, "Reviewer"),
//! ]));
//! let engine = FlowEngine::in_memory(directory);
//!
//! let mut graph = DefinitionGraph::new("Document Review", OperatorId(1));
//! graph.add_node(Node::start("start")).unwrap();
//! graph.add_node(Node::approval("review", "Review", ApprovalType::Or, [2])).unwrap();
//! graph.add_node(Node::end("end")).unwrap();
//! graph.connect("start", "review").unwrap();
//! graph.connect("review", "end").unwrap();
//! let graph = engine.publish(graph).await.unwrap();
//!
//! let launched = engine
//!     .start(&graph.id, OperatorId(1), BindData::default(), Opinion::pass(""))
//!     .await
//!     .unwrap();
//! let done = engine
//!     .submit(&launched.record.record_id, OperatorId(2), None, Opinion::pass("ok"))
//!     .await
//!     .unwrap();
//! assert_eq!(done.record.status, RecordStatus::Approved);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]

pub mod approval_resolver;
pub mod config;
pub mod context;
pub mod definition_registry;
pub mod directory;
pub mod engine;
pub mod guard_evaluator;
pub mod repository;
pub mod router;

pub use approval_resolver::{ApprovalResolver, ApprovalState, ApprovalStatus};
pub use config::EngineConfig;
pub use context::{CallbackOutcome, CallbackRegistry, ExecutionContext, NodeCallback};
pub use definition_registry::DefinitionRegistry;
pub use directory::{InMemoryDirectory, OperatorDirectory};
pub use engine::{FlowEngine, Outcome, UrgeNotice};
pub use guard_evaluator::{EvaluationContext, GuardEvaluator, GuardResult};
pub use repository::{GraphStore, InMemoryGraphStore, InMemoryRecordStore, RecordStore};
pub use router::{Route, Router};
