//! Execution context and per-node callbacks
//!
//! Before every action the engine assembles an [`ExecutionContext`]: a
//! read-only view of the instance, the graph, the acting operator and the
//! collaborators a callback may consult. The node's callback (if any) inspects
//! it and either lets the action proceed, optionally with a message, or vetoes
//! it with a [`NodeResult`] / [`OperatorResult`].
//!
//! Callbacks never re-enter the engine; everything they may use is handed to
//! them through the context.

use crate::directory::OperatorDirectory;
use dashmap::DashMap;
use flow_types::{
    BindData, DefinitionGraph, ExecutionRecord, FlowAction, FlowError, FlowResult, MessageResult,
    Node, NodeResult, Operator, OperatorId, OperatorResult, Opinion, Trail,
};
use std::sync::Arc;

// ── Execution Context ────────────────────────────────────────────────

/// Read-only view of one action, handed to node callbacks
pub struct ExecutionContext<'a> {
    /// The action being attempted
    pub action: FlowAction,
    /// Latest trail entry; `None` while creating
    pub record: Option<&'a ExecutionRecord>,
    /// Full history of the instance
    pub trail: &'a Trail,
    /// Graph the instance runs on
    pub graph: &'a DefinitionGraph,
    /// Node the action is performed at
    pub node: &'a Node,
    /// Creator of the instance
    pub creator: &'a Operator,
    /// Operator performing the action
    pub operator: &'a Operator,
    /// Bound data as submitted with this action
    pub data: &'a BindData,
    /// Opinion attached to this action
    pub opinion: &'a Opinion,
    /// Operator directory, for callbacks that need to look people up
    pub directory: &'a dyn OperatorDirectory,
}

impl<'a> ExecutionContext<'a> {
    /// Operators currently expected to act
    pub fn holders(&self) -> &'a [OperatorId] {
        self.record.map(|r| r.holders.as_slice()).unwrap_or(&[])
    }

    /// Trail entries before the current one
    pub fn history(&self) -> &'a [ExecutionRecord] {
        let len = self.trail.len();
        &self.trail.entries()[..len.saturating_sub(1)]
    }

    pub fn is_creator_acting(&self) -> bool {
        self.creator.id == self.operator.id
    }

    /// Veto the action at the current node
    pub fn node_error(&self) -> CallbackOutcome {
        CallbackOutcome::Node(NodeResult::new(self.node.code.clone()))
    }

    /// Veto the action naming another node by code
    pub fn node_error_at(&self, code: impl Into<String>) -> CallbackOutcome {
        CallbackOutcome::Node(NodeResult::new(code))
    }

    /// Veto the action naming the operators responsible
    pub fn operator_error(&self, ids: impl IntoIterator<Item = OperatorId>) -> CallbackOutcome {
        CallbackOutcome::Operator(OperatorResult::new(ids))
    }

    /// Start building a message for the successful outcome
    pub fn message(&self, title: impl Into<String>) -> MessageResult {
        MessageResult::new(title)
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("action", &self.action)
            .field("record", &self.trail.record_id())
            .field("node", &self.node.id)
            .field("operator", &self.operator.id)
            .finish_non_exhaustive()
    }
}

// ── Callbacks ────────────────────────────────────────────────────────

/// What a callback decided
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Let the action go ahead, optionally attaching a message
    Proceed(Option<MessageResult>),
    /// Veto naming a node
    Node(NodeResult),
    /// Veto naming operators
    Operator(OperatorResult),
}

impl CallbackOutcome {
    pub fn proceed() -> Self {
        Self::Proceed(None)
    }

    pub fn with_message(message: MessageResult) -> Self {
        Self::Proceed(Some(message))
    }

    /// Turn a veto into its error; pass a message through
    pub fn into_result(self) -> FlowResult<Option<MessageResult>> {
        match self {
            Self::Proceed(message) => Ok(message),
            Self::Node(result) => Err(FlowError::NodeRejected(result)),
            Self::Operator(result) => Err(FlowError::OperatorRejected(result)),
        }
    }
}

/// Custom logic attached to a node
pub trait NodeCallback: Send + Sync {
    fn on_action(&self, ctx: &ExecutionContext<'_>) -> CallbackOutcome;
}

impl<F> NodeCallback for F
where
    F: Fn(&ExecutionContext<'_>) -> CallbackOutcome + Send + Sync,
{
    fn on_action(&self, ctx: &ExecutionContext<'_>) -> CallbackOutcome {
        self(ctx)
    }
}

/// Callbacks by key, as referenced from nodes
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: DashMap<String, Arc<dyn NodeCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a callback
    pub fn register(&self, key: impl Into<String>, callback: impl NodeCallback + 'static) {
        let key = key.into();
        tracing::debug!(key = %key, "Node callback registered");
        self.callbacks.insert(key, Arc::new(callback));
    }

    /// Register a closure as a callback
    pub fn register_fn<F>(&self, key: impl Into<String>, callback: F)
    where
        F: Fn(&ExecutionContext<'_>) -> CallbackOutcome + Send + Sync + 'static,
    {
        self.register(key, callback);
    }

    /// Look a callback up; an unknown key is a configuration error
    pub fn get(&self, key: &str) -> FlowResult<Arc<dyn NodeCallback>> {
        self.callbacks
            .get(key)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| FlowError::Configuration(format!("no callback registered as '{}'", key)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.callbacks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.callbacks.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("CallbackRegistry").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use flow_types::{Decision, RecordId};

    #[test]
    fn test_outcome_into_result() {
        let message = MessageResult::new("done");
        assert_eq!(
            CallbackOutcome::with_message(message.clone()).into_result().unwrap(),
            Some(message)
        );
        assert!(matches!(
            CallbackOutcome::Node(NodeResult::new("n")).into_result(),
            Err(FlowError::NodeRejected(_))
        ));
        assert!(matches!(
            CallbackOutcome::Operator(OperatorResult::new([OperatorId(1)])).into_result(),
            Err(FlowError::OperatorRejected(_))
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = CallbackRegistry::new();
        registry.register_fn("always", |_| CallbackOutcome::proceed());

        assert!(registry.contains("always"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("always").is_ok());
        assert!(matches!(
            registry.get("missing"),
            Err(FlowError::Configuration(_))
        ));
    }

    #[test]
    fn test_context_helpers() {
        let mut graph = DefinitionGraph::new("g", OperatorId(1));
        graph.add_node(Node::start("start").with_code("S-1")).unwrap();
        let node = graph.nodes[0].clone();
        let trail = Trail::new(RecordId::new("r"));
        let alice = Operator::new(1, "Alice");
        let bob = Operator::new(2, "Bob");
        let data = BindData::default();
        let opinion = Opinion::save("");
        let directory = InMemoryDirectory::new();

        let ctx = ExecutionContext {
            action: FlowAction::Create,
            record: None,
            trail: &trail,
            graph: &graph,
            node: &node,
            creator: &alice,
            operator: &bob,
            data: &data,
            opinion: &opinion,
            directory: &directory,
        };

        assert!(ctx.holders().is_empty());
        assert!(ctx.history().is_empty());
        assert!(!ctx.is_creator_acting());
        assert_eq!(ctx.opinion.decision, Decision::None);
        assert_eq!(ctx.node_error(), CallbackOutcome::Node(NodeResult::new("S-1")));
        assert_eq!(
            ctx.operator_error([OperatorId(2)]),
            CallbackOutcome::Operator(OperatorResult::new([OperatorId(2)]))
        );
        assert_eq!(ctx.message("t").with_item("k", "v").items.len(), 1);
    }
}
