//! Flow engine: the entry point for driving approval flow instances
//!
//! Every mutating operation follows the same shape:
//! 1. Serialise on the record (per-record async mutex)
//! 2. Load the trail and the graph version it is pinned to
//! 3. Check state, then permission
//! 4. Run the node's callback with a read-only execution context
//! 5. Compute the next entry (resolver + router)
//! 6. Append it with a compare-and-swap on the sequence
//!
//! A failure at any step appends nothing.

use crate::approval_resolver::{ApprovalResolver, ApprovalStatus};
use crate::config::EngineConfig;
use crate::context::{CallbackRegistry, ExecutionContext};
use crate::definition_registry::DefinitionRegistry;
use crate::directory::OperatorDirectory;
use crate::guard_evaluator::EvaluationContext;
use crate::repository::{GraphStore, InMemoryGraphStore, InMemoryRecordStore, RecordStore};
use crate::router::{Route, Router};
use chrono::Utc;
use dashmap::DashMap;
use flow_types::{
    BindData, Decision, DefinitionGraph, ExecutionRecord, FlowAction, FlowError, FlowResult,
    GraphId, MessageResult, Node, NodeId, NodeType, Operator, OperatorId, Opinion, RecordId,
    RecordStatus, Trail,
};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

// ── Results ──────────────────────────────────────────────────────────

/// Result of a successful mutating operation
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    /// The entry appended to the trail
    pub record: ExecutionRecord,
    /// Message attached by the node's callback
    pub message: Option<MessageResult>,
}

/// Result of urging a pending instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrgeNotice {
    pub record_id: RecordId,
    /// Node the instance is waiting at
    pub node_id: NodeId,
    /// Operators being urged
    pub holders: Vec<OperatorId>,
    pub message: MessageResult,
}

/// One attempted action, as seen by the callback
struct Attempt<'a> {
    action: FlowAction,
    operator: &'a Operator,
    data: &'a BindData,
    opinion: &'a Opinion,
}

// ── Engine ───────────────────────────────────────────────────────────

/// The approval flow engine
pub struct FlowEngine {
    config: EngineConfig,
    definitions: DefinitionRegistry,
    records: Arc<dyn RecordStore>,
    directory: Arc<dyn OperatorDirectory>,
    callbacks: Arc<CallbackRegistry>,
    resolver: ApprovalResolver,
    router: Router,
    /// One mutex per record with an operation in flight
    locks: DashMap<RecordId, Arc<Mutex<()>>>,
}

impl FlowEngine {
    /// Create an engine over the given stores and directory
    pub fn new(
        config: EngineConfig,
        graphs: Arc<dyn GraphStore>,
        records: Arc<dyn RecordStore>,
        directory: Arc<dyn OperatorDirectory>,
    ) -> Self {
        Self {
            router: Router::new(config.max_route_hops),
            resolver: ApprovalResolver::new(Arc::clone(&directory)),
            definitions: DefinitionRegistry::new(graphs),
            records,
            directory,
            callbacks: Arc::new(CallbackRegistry::new()),
            locks: DashMap::new(),
            config,
        }
    }

    /// Create an engine backed by in-memory stores
    pub fn in_memory(directory: Arc<dyn OperatorDirectory>) -> Self {
        Self::new(
            EngineConfig::default(),
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(InMemoryRecordStore::new()),
            directory,
        )
    }

    /// Share a callback registry with this engine
    pub fn with_callbacks(mut self, callbacks: Arc<CallbackRegistry>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The callback registry; register callbacks here
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    // ── Definitions ──────────────────────────────────────────────────

    /// Publish a graph as the next version of its id
    pub async fn publish(&self, graph: DefinitionGraph) -> FlowResult<Arc<DefinitionGraph>> {
        for key in graph.nodes.iter().filter_map(|n| n.callback.as_deref()) {
            if !self.callbacks.contains(key) {
                warn!(graph_id = %graph.id, callback = key, "Graph references an unregistered callback");
            }
        }
        self.definitions.publish(graph).await
    }

    /// One version of a graph
    pub async fn graph(&self, id: &GraphId, version: u32) -> FlowResult<Arc<DefinitionGraph>> {
        self.definitions.get(id, version).await
    }

    /// Latest version of a graph
    pub async fn latest_graph(&self, id: &GraphId) -> FlowResult<Arc<DefinitionGraph>> {
        self.definitions.latest(id).await
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Full history of an instance
    pub async fn trail(&self, record_id: &RecordId) -> FlowResult<Trail> {
        self.records
            .load_trail(record_id)
            .await?
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FlowError::RecordNotFound(record_id.clone()))
    }

    /// Current state of an instance
    pub async fn current(&self, record_id: &RecordId) -> FlowResult<ExecutionRecord> {
        let trail = self.trail(record_id).await?;
        latest(&trail).cloned()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Create a draft instance of the latest version of a graph
    pub async fn create(
        &self,
        graph_id: &GraphId,
        operator: OperatorId,
        data: BindData,
        advice: impl Into<String>,
    ) -> FlowResult<Outcome> {
        let graph = self.launchable(graph_id).await?;
        let operator = self.operator(operator)?;
        let start = start_node(&graph)?;
        let trail = Trail::new(RecordId::generate());
        let opinion = Opinion::save(advice);

        let attempt = Attempt {
            action: FlowAction::Create,
            operator: &operator,
            data: &data,
            opinion: &opinion,
        };
        let message = self.run_callback(&attempt, &trail, &graph, start)?;

        let mut entry = first_entry(&trail, &graph, start, operator.id, data);
        entry.opinion = draft_opinion(opinion);

        let outcome = self.commit(entry, message).await?;
        info!(
            record_id = %outcome.record.record_id,
            graph_id = %graph.id,
            version = graph.version,
            creator = %operator.id,
            "Flow instance created"
        );
        Ok(outcome)
    }

    /// Create an instance and submit it in one transition
    pub async fn start(
        &self,
        graph_id: &GraphId,
        operator: OperatorId,
        data: BindData,
        opinion: Opinion,
    ) -> FlowResult<Outcome> {
        let graph = self.launchable(graph_id).await?;
        let operator = self.operator(operator)?;
        let start = start_node(&graph)?;
        let trail = Trail::new(RecordId::generate());

        let attempt = Attempt {
            action: FlowAction::Submit,
            operator: &operator,
            data: &data,
            opinion: &opinion,
        };
        let message = self.run_callback(&attempt, &trail, &graph, start)?;

        let route = self
            .router
            .route_pass(&graph, &start.id, &EvaluationContext::from_bind_data(&data))?;
        let mut entry = first_entry(&trail, &graph, start, operator.id, data);
        entry.action = FlowAction::Submit;
        entry.opinion = Some(opinion);
        self.settle(&graph, route, &mut entry)?;

        let outcome = self.commit(entry, message).await?;
        info!(
            record_id = %outcome.record.record_id,
            graph_id = %graph.id,
            node = %outcome.record.node_id,
            status = %outcome.record.status,
            "Flow instance launched"
        );
        Ok(outcome)
    }

    /// Replace the bound data of a draft
    pub async fn save(
        &self,
        record_id: &RecordId,
        operator: OperatorId,
        data: BindData,
        advice: impl Into<String>,
    ) -> FlowResult<Outcome> {
        let _guard = self.lock_record(record_id).await;

        let (trail, graph) = self.load(record_id).await?;
        let operator = self.operator(operator)?;
        let current = latest(&trail)?;

        if current.status != RecordStatus::Draft {
            return Err(invalid_state(current, FlowAction::Save));
        }
        if !self.is_privileged(&operator, current.creator) {
            return Err(self.deny(&operator, current, FlowAction::Save));
        }

        let opinion = Opinion::save(advice);
        let node = node_of(&graph, &current.node_id)?;
        let attempt = Attempt {
            action: FlowAction::Save,
            operator: &operator,
            data: &data,
            opinion: &opinion,
        };
        let message = self.run_callback(&attempt, &trail, &graph, node)?;

        let mut entry = successor(current, FlowAction::Save, operator.id, data);
        entry.opinion = draft_opinion(opinion);

        self.commit(entry, message).await
    }

    /// Submit a draft, or approve/reject a pending instance
    ///
    /// `data` replaces the bound snapshot; `None` keeps the current one.
    pub async fn submit(
        &self,
        record_id: &RecordId,
        operator: OperatorId,
        data: Option<BindData>,
        opinion: Opinion,
    ) -> FlowResult<Outcome> {
        let _guard = self.lock_record(record_id).await;

        let (trail, graph) = self.load(record_id).await?;
        let operator = self.operator(operator)?;
        let current = latest(&trail)?;
        let data = data.unwrap_or_else(|| current.data.clone());

        let (entry, message) = match current.status {
            RecordStatus::Draft => self.plan_draft_submit(&trail, &graph, &operator, data, opinion)?,
            RecordStatus::Pending => self.plan_decision(&trail, &graph, &operator, data, opinion)?,
            _ => return Err(invalid_state(current, FlowAction::Submit)),
        };

        let outcome = self.commit(entry, message).await?;
        if outcome.record.status.is_terminal() {
            info!(
                record_id = %record_id,
                status = %outcome.record.status,
                "Flow instance finished"
            );
        }
        Ok(outcome)
    }

    /// Remind the current holders of a pending instance; appends nothing
    pub async fn urge(&self, record_id: &RecordId, operator: OperatorId) -> FlowResult<UrgeNotice> {
        let (trail, graph) = self.load(record_id).await?;
        let operator = self.operator(operator)?;
        let current = latest(&trail)?;

        if current.status != RecordStatus::Pending {
            return Err(invalid_state(current, FlowAction::Urge));
        }
        if !self.is_privileged(&operator, current.creator) {
            return Err(self.deny(&operator, current, FlowAction::Urge));
        }

        let node = node_of(&graph, &current.node_id)?;
        let opinion = Opinion::default();
        let attempt = Attempt {
            action: FlowAction::Urge,
            operator: &operator,
            data: &current.data,
            opinion: &opinion,
        };
        let message = self.run_callback(&attempt, &trail, &graph, node)?;

        let message = message.unwrap_or_else(|| {
            let holders: Vec<String> = current.holders.iter().map(|h| h.to_string()).collect();
            MessageResult::new(format!("Awaiting your approval: {}", graph.title))
                .with_item("node", node.name.clone())
                .with_item("holders", holders.join(", "))
        });

        info!(
            record_id = %record_id,
            node = %node.id,
            holders = current.holders.len(),
            "Holders urged"
        );
        Ok(UrgeNotice {
            record_id: record_id.clone(),
            node_id: current.node_id.clone(),
            holders: current.holders.clone(),
            message,
        })
    }

    /// Withdraw a pending instance that is still at its first approval step
    pub async fn recall(&self, record_id: &RecordId, operator: OperatorId) -> FlowResult<Outcome> {
        let _guard = self.lock_record(record_id).await;

        let (trail, graph) = self.load(record_id).await?;
        let operator = self.operator(operator)?;
        let current = latest(&trail)?;

        let first_visit = trail.first_pending().map(|e| e.visit);
        if current.status != RecordStatus::Pending || first_visit != Some(current.visit) {
            return Err(FlowError::InvalidState(format!(
                "record {} can no longer be recalled ({} at '{}')",
                current.record_id, current.status, current.node_id
            )));
        }
        if !self.is_privileged(&operator, current.creator) {
            return Err(self.deny(&operator, current, FlowAction::Recall));
        }

        let node = node_of(&graph, &current.node_id)?;
        let opinion = Opinion::default();
        let attempt = Attempt {
            action: FlowAction::Recall,
            operator: &operator,
            data: &current.data,
            opinion: &opinion,
        };
        let message = self.run_callback(&attempt, &trail, &graph, node)?;

        let mut entry = successor(current, FlowAction::Recall, operator.id, current.data.clone());
        entry.status = RecordStatus::Recalled;
        entry.holders.clear();

        let outcome = self.commit(entry, message).await?;
        info!(record_id = %record_id, operator = %operator.id, "Flow instance recalled");
        Ok(outcome)
    }

    /// Postpone a pending instance, up to the graph's limit
    pub async fn postpone(&self, record_id: &RecordId, operator: OperatorId) -> FlowResult<Outcome> {
        let _guard = self.lock_record(record_id).await;

        let (trail, graph) = self.load(record_id).await?;
        let operator = self.operator(operator)?;
        let current = latest(&trail)?;

        if current.status != RecordStatus::Pending {
            return Err(invalid_state(current, FlowAction::Postpone));
        }
        let may_postpone = current.holders.contains(&operator.id) || operator.flow_manager;
        if !may_postpone {
            return Err(self.deny(&operator, current, FlowAction::Postpone));
        }
        let attempted = current.postponed + 1;
        if attempted > graph.postponed_max {
            warn!(record_id = %record_id, attempted, max = graph.postponed_max, "Postpone limit exceeded");
            return Err(FlowError::PostponeLimitExceeded {
                attempted,
                max: graph.postponed_max,
            });
        }

        let node = node_of(&graph, &current.node_id)?;
        let opinion = Opinion::default();
        let attempt = Attempt {
            action: FlowAction::Postpone,
            operator: &operator,
            data: &current.data,
            opinion: &opinion,
        };
        let message = self.run_callback(&attempt, &trail, &graph, node)?;

        let mut entry = successor(current, FlowAction::Postpone, operator.id, current.data.clone());
        entry.postponed = attempted;

        debug!(record_id = %record_id, postponed = attempted, "Flow instance postponed");
        self.commit(entry, message).await
    }

    /// Close an instance administratively
    ///
    /// The creator may close a draft; a flow manager may close a draft or a
    /// pending instance.
    pub async fn close(
        &self,
        record_id: &RecordId,
        operator: OperatorId,
        advice: impl Into<String>,
    ) -> FlowResult<Outcome> {
        let _guard = self.lock_record(record_id).await;

        let (trail, graph) = self.load(record_id).await?;
        let operator = self.operator(operator)?;
        let current = latest(&trail)?;

        let allowed = match current.status {
            RecordStatus::Draft => operator.id == current.creator || operator.flow_manager,
            RecordStatus::Pending => operator.flow_manager,
            _ => return Err(invalid_state(current, FlowAction::Close)),
        };
        if !allowed {
            return Err(self.deny(&operator, current, FlowAction::Close));
        }

        let opinion = Opinion::save(advice);
        let node = node_of(&graph, &current.node_id)?;
        let attempt = Attempt {
            action: FlowAction::Close,
            operator: &operator,
            data: &current.data,
            opinion: &opinion,
        };
        let message = self.run_callback(&attempt, &trail, &graph, node)?;

        let mut entry = successor(current, FlowAction::Close, operator.id, current.data.clone());
        entry.status = RecordStatus::Closed;
        entry.holders.clear();
        entry.opinion = draft_opinion(opinion);

        let outcome = self.commit(entry, message).await?;
        info!(record_id = %record_id, operator = %operator.id, "Flow instance closed");
        Ok(outcome)
    }

    // ── Transition planning ──────────────────────────────────────────

    fn plan_draft_submit(
        &self,
        trail: &Trail,
        graph: &DefinitionGraph,
        operator: &Operator,
        data: BindData,
        opinion: Opinion,
    ) -> FlowResult<(ExecutionRecord, Option<MessageResult>)> {
        let current = latest(trail)?;
        if !self.is_privileged(operator, current.creator) {
            return Err(self.deny(operator, current, FlowAction::Submit));
        }

        let node = node_of(graph, &current.node_id)?;
        let attempt = Attempt {
            action: FlowAction::Submit,
            operator,
            data: &data,
            opinion: &opinion,
        };
        let message = self.run_callback(&attempt, trail, graph, node)?;

        let route = self
            .router
            .route_pass(graph, &node.id, &EvaluationContext::from_bind_data(&data))?;
        let mut entry = successor(current, FlowAction::Submit, operator.id, data);
        entry.opinion = Some(opinion);
        self.settle(graph, route, &mut entry)?;

        Ok((entry, message))
    }

    fn plan_decision(
        &self,
        trail: &Trail,
        graph: &DefinitionGraph,
        operator: &Operator,
        data: BindData,
        opinion: Opinion,
    ) -> FlowResult<(ExecutionRecord, Option<MessageResult>)> {
        let current = latest(trail)?;
        let node = node_of(graph, &current.node_id)?;
        if !node.is_approval() {
            return Err(FlowError::InvalidState(format!(
                "record {} is pending at non-approval node '{}'",
                current.record_id, node.id
            )));
        }

        // Operators are resolved against the snapshot the visit started with
        let visit_data = trail
            .entry(current.visit)
            .map_or(&current.data, |entered| &entered.data);
        let decisions = trail.decisions_in_visit(&node.id, current.visit);
        let state = self
            .resolver
            .assess(node, current.creator, visit_data, &decisions)?;

        // A flow manager outside the required set decides the node outright;
        // a required one votes in turn like everyone else
        let overriding = if state.can_act(operator.id) {
            false
        } else if self.config.manager_override
            && operator.flow_manager
            && !state.required.contains(&operator.id)
        {
            true
        } else {
            return Err(self.deny(operator, current, FlowAction::Submit));
        };

        if !opinion.is_decision() {
            return Err(FlowError::InvalidState(format!(
                "a decision is required to act on record {} at '{}'",
                current.record_id, node.id
            )));
        }

        let attempt = Attempt {
            action: FlowAction::Submit,
            operator,
            data: &data,
            opinion: &opinion,
        };
        let message = self.run_callback(&attempt, trail, graph, node)?;

        let next = state.with_decision(operator.id, opinion.decision);
        let status = if overriding {
            match opinion.decision {
                Decision::Approve => ApprovalStatus::Approved,
                Decision::Reject => ApprovalStatus::Rejected,
                Decision::None => ApprovalStatus::Pending,
            }
        } else {
            next.status()
        };

        debug!(
            record_id = %current.record_id,
            node = %node.id,
            operator = %operator.id,
            decision = ?opinion.decision,
            approval_type = ?node.approval_type,
            result = ?status,
            overriding,
            "Decision evaluated"
        );

        let eval = EvaluationContext::from_bind_data(&data);
        let mut entry = successor(current, FlowAction::Submit, operator.id, data);
        entry.opinion = Some(opinion);

        match status {
            ApprovalStatus::Pending => {
                entry.holders = next.pending_holders();
            }
            ApprovalStatus::Approved => {
                let route = self.router.route_pass(graph, &node.id, &eval)?;
                self.settle(graph, route, &mut entry)?;
            }
            ApprovalStatus::Rejected => match self.router.route_reject(graph, &node.id, &eval)? {
                Some(route) => self.settle(graph, route, &mut entry)?,
                None => {
                    entry.status = RecordStatus::Rejected;
                    entry.holders.clear();
                }
            },
        }

        Ok((entry, message))
    }

    /// Move an entry to the end of a route
    fn settle(
        &self,
        graph: &DefinitionGraph,
        route: Route,
        entry: &mut ExecutionRecord,
    ) -> FlowResult<()> {
        let node = node_of(graph, &route.target)?;
        entry.node_id = route.target;
        entry.visit = entry.sequence;
        entry.route = route.path;

        match node.node_type {
            NodeType::Approval => {
                let state = self
                    .resolver
                    .assess(node, entry.creator, &entry.data, &[])?;
                entry.status = RecordStatus::Pending;
                entry.holders = state.pending_holders();
            }
            NodeType::End => {
                entry.status = RecordStatus::Approved;
                entry.holders.clear();
            }
            NodeType::Start => {
                entry.status = RecordStatus::Draft;
                entry.holders = vec![entry.creator];
            }
            NodeType::Condition => {
                return Err(FlowError::Configuration(format!(
                    "route ended at condition node '{}'",
                    node.id
                )))
            }
        }
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn run_callback(
        &self,
        attempt: &Attempt<'_>,
        trail: &Trail,
        graph: &DefinitionGraph,
        node: &Node,
    ) -> FlowResult<Option<MessageResult>> {
        let key = match node.callback.as_deref() {
            Some(key) => key,
            None => return Ok(None),
        };
        let callback = self.callbacks.get(key)?;

        let record = trail.current();
        let creator = match record {
            Some(r) if r.creator != attempt.operator.id => self.operator(r.creator)?,
            _ => attempt.operator.clone(),
        };

        let ctx = ExecutionContext {
            action: attempt.action,
            record,
            trail,
            graph,
            node,
            creator: &creator,
            operator: attempt.operator,
            data: attempt.data,
            opinion: attempt.opinion,
            directory: self.directory.as_ref(),
        };

        callback.on_action(&ctx).into_result().map_err(|e| {
            warn!(
                record_id = %trail.record_id(),
                node = %node.id,
                action = %attempt.action,
                callback = key,
                error = %e,
                "Action vetoed by node callback"
            );
            e
        })
    }

    async fn commit(
        &self,
        entry: ExecutionRecord,
        message: Option<MessageResult>,
    ) -> FlowResult<Outcome> {
        self.records.append_record(entry.clone()).await?;

        debug!(
            record_id = %entry.record_id,
            sequence = entry.sequence,
            action = %entry.action,
            status = %entry.status,
            node = %entry.node_id,
            "Transition committed"
        );
        Ok(Outcome {
            record: entry,
            message,
        })
    }

    async fn load(&self, record_id: &RecordId) -> FlowResult<(Trail, Arc<DefinitionGraph>)> {
        let trail = self.trail(record_id).await?;
        let (graph_id, version) = {
            let current = latest(&trail)?;
            (current.graph_id.clone(), current.graph_version)
        };
        let graph = self.definitions.get(&graph_id, version).await?;
        Ok((trail, graph))
    }

    async fn launchable(&self, graph_id: &GraphId) -> FlowResult<Arc<DefinitionGraph>> {
        let graph = self.definitions.latest(graph_id).await?;
        if self.config.require_enabled_graph && !graph.enabled {
            return Err(FlowError::GraphDisabled(graph_id.clone()));
        }
        Ok(graph)
    }

    fn operator(&self, id: OperatorId) -> FlowResult<Operator> {
        self.directory
            .find_by_id(id)
            .ok_or(FlowError::OperatorNotFound(id))
    }

    /// The creator, or any flow manager
    fn is_privileged(&self, operator: &Operator, creator: OperatorId) -> bool {
        operator.id == creator || operator.flow_manager
    }

    fn deny(&self, operator: &Operator, current: &ExecutionRecord, action: FlowAction) -> FlowError {
        warn!(
            record_id = %current.record_id,
            operator = %operator.id,
            action = %action,
            status = %current.status,
            "Permission denied"
        );
        FlowError::Permission(format!(
            "operator {} may not {} record {} at '{}'",
            operator.id, action, current.record_id, current.node_id
        ))
    }

    /// Serialise on one record until the returned guard drops
    async fn lock_record(&self, record_id: &RecordId) -> RecordGuard<'_> {
        let lock = {
            let entry = self
                .locks
                .entry(record_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        RecordGuard {
            guard: Some(lock.lock_owned().await),
            locks: &self.locks,
            record_id: record_id.clone(),
        }
    }
}

/// Holds a record's lock; drops the table entry once nobody else waits on it
struct RecordGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<RecordId, Arc<Mutex<()>>>,
    record_id: RecordId,
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Clones are only taken under the shard lock, so a count of one is final
        self.locks
            .remove_if(&self.record_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl std::fmt::Debug for FlowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowEngine")
            .field("config", &self.config)
            .field("definitions", &self.definitions)
            .field("callbacks", &self.callbacks)
            .field("locked_records", &self.locks.len())
            .finish_non_exhaustive()
    }
}

// ── Entry construction ───────────────────────────────────────────────

fn latest(trail: &Trail) -> FlowResult<&ExecutionRecord> {
    trail
        .current()
        .ok_or_else(|| FlowError::RecordNotFound(trail.record_id().clone()))
}

fn start_node(graph: &DefinitionGraph) -> FlowResult<&Node> {
    graph.start_node().ok_or_else(|| {
        FlowError::Configuration(format!("graph {} has no start node", graph.id))
    })
}

fn node_of<'g>(graph: &'g DefinitionGraph, id: &NodeId) -> FlowResult<&'g Node> {
    graph.node(id).ok_or_else(|| {
        FlowError::Configuration(format!(
            "node '{}' not found in graph {} version {}",
            id, graph.id, graph.version
        ))
    })
}

fn invalid_state(current: &ExecutionRecord, action: FlowAction) -> FlowError {
    FlowError::InvalidState(format!(
        "cannot {} record {} while {}",
        action, current.record_id, current.status
    ))
}

/// Drafts carry an opinion only when there is advice to keep
fn draft_opinion(opinion: Opinion) -> Option<Opinion> {
    (!opinion.advice.is_empty()).then_some(opinion)
}

/// The DRAFT entry that opens a trail
fn first_entry(
    trail: &Trail,
    graph: &DefinitionGraph,
    start: &Node,
    creator: OperatorId,
    data: BindData,
) -> ExecutionRecord {
    let now = Utc::now();
    ExecutionRecord {
        sequence: trail.next_sequence(),
        record_id: trail.record_id().clone(),
        graph_id: graph.id.clone(),
        graph_version: graph.version,
        node_id: start.id.clone(),
        visit: trail.next_sequence(),
        status: RecordStatus::Draft,
        action: FlowAction::Create,
        creator,
        operator: creator,
        holders: vec![creator],
        opinion: None,
        data,
        postponed: 0,
        route: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

/// The next entry, staying at the current node unless changed
fn successor(
    current: &ExecutionRecord,
    action: FlowAction,
    operator: OperatorId,
    data: BindData,
) -> ExecutionRecord {
    ExecutionRecord {
        sequence: current.sequence + 1,
        record_id: current.record_id.clone(),
        graph_id: current.graph_id.clone(),
        graph_version: current.graph_version,
        node_id: current.node_id.clone(),
        visit: current.visit,
        status: current.status,
        action,
        creator: current.creator,
        operator,
        holders: current.holders.clone(),
        opinion: None,
        data,
        postponed: current.postponed,
        route: Vec::new(),
        created_at: current.created_at,
        updated_at: Utc::now(),
    }
}
