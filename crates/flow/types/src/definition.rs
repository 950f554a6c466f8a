//! Definition graphs: the template every approval flow instance follows
//!
//! A DefinitionGraph is a directed graph where:
//! - Nodes are approval steps (or control points: start, condition, end)
//! - Relations are transitions, optionally guarded by a condition
//!
//! Graphs are immutable once published. To modify, publish a new version.

use crate::{FlowError, FlowResult, OperatorId, Relation, RelationId, RelationKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a definition graph
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub String);

impl GraphId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a node within a graph
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Definition Graph ─────────────────────────────────────────────────

/// A definition graph: the blueprint for an approval flow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefinitionGraph {
    /// Unique identifier
    pub id: GraphId,
    /// Published version; 0 until first published
    pub version: u32,
    /// Human-readable title
    pub title: String,
    /// What this flow approves
    pub description: String,
    /// Who designed this graph
    pub creator: OperatorId,
    /// When this graph was created
    pub created_at: DateTime<Utc>,
    /// When this graph was last changed
    pub updated_at: DateTime<Utc>,
    /// Disabled graphs cannot start new instances
    pub enabled: bool,
    /// How many times a pending record may be postponed
    pub postponed_max: u32,
    /// The nodes, in declaration order
    pub nodes: Vec<Node>,
    /// The relations, in declaration order (which is also routing order)
    pub relations: Vec<Relation>,
}

impl DefinitionGraph {
    /// Create a new, empty, enabled definition graph
    pub fn new(title: impl Into<String>, creator: OperatorId) -> Self {
        let now = Utc::now();
        Self {
            id: GraphId::generate(),
            version: 0,
            title: title.into(),
            description: String::new(),
            creator,
            created_at: now,
            updated_at: now,
            enabled: true,
            postponed_max: 1,
            nodes: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: GraphId) -> Self {
        self.id = id;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_postponed_max(mut self, max: u32) -> Self {
        self.postponed_max = max;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, node: Node) -> FlowResult<()> {
        if self.nodes.iter().any(|n| n.id == node.id) {
            return Err(FlowError::Configuration(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Add a relation to the graph
    pub fn add_relation(&mut self, relation: Relation) -> FlowResult<()> {
        // Verify source and target nodes exist
        for end in [&relation.source, &relation.target] {
            if self.node(end).is_none() {
                return Err(FlowError::Configuration(format!(
                    "relation '{}' references unknown node '{}'",
                    relation.id, end
                )));
            }
        }
        if self.relations.iter().any(|r| r.id == relation.id) {
            return Err(FlowError::Configuration(format!(
                "duplicate relation id '{}'",
                relation.id
            )));
        }
        self.relations.push(relation);
        Ok(())
    }

    /// Connect two nodes with an unguarded pass relation
    pub fn connect(&mut self, source: &str, target: &str) -> FlowResult<()> {
        let id = RelationId::new(format!("{}->{}", source, target));
        self.add_relation(Relation::pass(id, NodeId::new(source), NodeId::new(target)))
    }

    /// Get the start node
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_type == NodeType::Start)
    }

    /// Get the end nodes
    pub fn end_nodes(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::End)
            .collect()
    }

    /// Get a node by ID
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Get a node by its human-readable code
    pub fn node_by_code(&self, code: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.code == code)
    }

    /// Position of a node in the node table
    pub fn node_index(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.id == id)
    }

    /// Outgoing relations of a node, in declaration order
    pub fn outgoing(&self, node_id: &NodeId) -> Vec<&Relation> {
        self.relations
            .iter()
            .filter(|r| &r.source == node_id)
            .collect()
    }

    /// Outgoing relations of one kind, in declaration order
    pub fn outgoing_of_kind(&self, node_id: &NodeId, kind: RelationKind) -> Vec<&Relation> {
        self.relations
            .iter()
            .filter(|r| &r.source == node_id && r.kind == kind)
            .collect()
    }

    /// Incoming relations of a node
    pub fn incoming(&self, node_id: &NodeId) -> Vec<&Relation> {
        self.relations
            .iter()
            .filter(|r| &r.target == node_id)
            .collect()
    }

    /// Validate the graph for structural correctness
    pub fn validate(&self) -> FlowResult<()> {
        let start_count = self
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Start)
            .count();
        if start_count != 1 {
            return Err(FlowError::Configuration(format!(
                "graph must have exactly one start node, found {}",
                start_count
            )));
        }

        if self.end_nodes().is_empty() {
            return Err(FlowError::Configuration(
                "graph must have at least one end node".into(),
            ));
        }

        let mut seen_ids = HashSet::new();
        for node in &self.nodes {
            if !seen_ids.insert(&node.id) {
                return Err(FlowError::Configuration(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            if node.node_type == NodeType::Approval && node.assignment.is_empty() {
                return Err(FlowError::Configuration(format!(
                    "approval node '{}' has no assigned operators",
                    node.id
                )));
            }
        }

        let mut seen_relations = HashSet::new();
        for relation in &self.relations {
            if !seen_relations.insert(&relation.id) {
                return Err(FlowError::Configuration(format!(
                    "duplicate relation id '{}'",
                    relation.id
                )));
            }
            for end in [&relation.source, &relation.target] {
                if !seen_ids.contains(end) {
                    return Err(FlowError::Configuration(format!(
                        "relation '{}' references unknown node '{}'",
                        relation.id, end
                    )));
                }
            }
        }

        // Checked above: exactly one start node exists
        if let Some(start) = self.start_node() {
            if self.outgoing_of_kind(&start.id, RelationKind::Pass).is_empty() {
                return Err(FlowError::Configuration(format!(
                    "start node '{}' has no outgoing relation",
                    start.id
                )));
            }

            let reachable = self.reachable_from(&start.id);
            if let Some(island) = self.nodes.iter().find(|n| !reachable.contains(&n.id)) {
                return Err(FlowError::Configuration(format!(
                    "node '{}' is unreachable from start",
                    island.id
                )));
            }
        }

        Ok(())
    }

    /// Find all nodes reachable from a given node
    fn reachable_from(&self, start: &NodeId) -> HashSet<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = vec![start.clone()];

        while let Some(current) = queue.pop() {
            if visited.insert(current.clone()) {
                for relation in self.outgoing(&current) {
                    if !visited.contains(&relation.target) {
                        queue.push(relation.target.clone());
                    }
                }
            }
        }

        visited
    }

    /// Total number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of relations
    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }
}

// ── Node ─────────────────────────────────────────────────────────────

/// A step in the definition graph
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this graph
    pub id: NodeId,
    /// Human-readable code, used in callback results
    pub code: String,
    /// Display name
    pub name: String,
    /// Node type (start, approval, condition, end)
    pub node_type: NodeType,
    /// How multiple operators reach consensus (approval nodes only)
    pub approval_type: ApprovalType,
    /// Who must act at this node
    pub assignment: OperatorAssignment,
    /// Key of a registered callback to run on every action at this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
}

impl Node {
    /// Create a new node
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        let id = id.into();
        Self {
            code: id.clone(),
            id: NodeId::new(id),
            name: name.into(),
            node_type,
            approval_type: ApprovalType::Or,
            assignment: OperatorAssignment::Static(Vec::new()),
            callback: None,
        }
    }

    /// Create a start node
    pub fn start(id: impl Into<String>) -> Self {
        Self::new(id, "Start", NodeType::Start)
    }

    /// Create an end node
    pub fn end(id: impl Into<String>) -> Self {
        Self::new(id, "End", NodeType::End)
    }

    /// Create a condition (routing-only) node
    pub fn condition(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeType::Condition)
    }

    /// Create an approval node assigned to a static list of operators
    pub fn approval(
        id: impl Into<String>,
        name: impl Into<String>,
        approval_type: ApprovalType,
        operators: impl IntoIterator<Item = u64>,
    ) -> Self {
        let mut node = Self::new(id, name, NodeType::Approval);
        node.approval_type = approval_type;
        node.assignment =
            OperatorAssignment::Static(operators.into_iter().map(OperatorId).collect());
        node
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_assignment(mut self, assignment: OperatorAssignment) -> Self {
        self.assignment = assignment;
        self
    }

    pub fn with_callback(mut self, key: impl Into<String>) -> Self {
        self.callback = Some(key.into());
        self
    }

    /// Check if this node waits for human decisions
    pub fn is_approval(&self) -> bool {
        self.node_type == NodeType::Approval
    }

    /// Check if the engine passes through this node without stopping
    pub fn is_pass_through(&self) -> bool {
        matches!(self.node_type, NodeType::Condition)
    }
}

// ── Node Type ────────────────────────────────────────────────────────

/// The type of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// The entry point; where drafts live
    Start,
    /// Human operators approve or reject here
    Approval,
    /// Routing point: outgoing guards pick the branch
    Condition,
    /// Reaching an end node approves the instance
    End,
}

/// Consensus rule for multiple operators at one approval node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalType {
    /// Everyone must approve; one reject rejects
    And,
    /// One approve approves; everyone must reject to reject
    Or,
    /// Operators act one at a time, in order; one reject rejects
    Sequential,
}

// ── Operator Assignment ──────────────────────────────────────────────

/// Who must act at a node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorAssignment {
    /// A fixed, ordered list of operator ids
    Static(Vec<OperatorId>),
    /// An expression evaluated against the record at runtime:
    /// `creator`, or a dotted path into the bound data snapshot
    Expression(String),
}

impl OperatorAssignment {
    pub fn expression(expr: impl Into<String>) -> Self {
        Self::Expression(expr.into())
    }

    /// A static assignment with no operators, or a blank expression
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Static(ids) => ids.is_empty(),
            Self::Expression(expr) => expr.trim().is_empty(),
        }
    }
}

impl Default for OperatorAssignment {
    fn default() -> Self {
        Self::Static(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_simple_graph() -> DefinitionGraph {
        let mut graph = DefinitionGraph::new("Leave Request", OperatorId(1))
            .with_description("Two managers sign off on leave");

        graph.add_node(Node::start("start")).unwrap();
        graph
            .add_node(Node::approval("review", "Manager Review", ApprovalType::And, [10, 11]))
            .unwrap();
        graph.add_node(Node::end("end")).unwrap();

        graph.connect("start", "review").unwrap();
        graph.connect("review", "end").unwrap();

        graph
    }

    #[test]
    fn test_create_graph() {
        let graph = make_simple_graph();

        assert_eq!(graph.title, "Leave Request");
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.relation_count(), 2);
        assert!(graph.start_node().is_some());
        assert_eq!(graph.end_nodes().len(), 1);
        assert!(graph.enabled);
    }

    #[test]
    fn test_validate_valid_graph() {
        let graph = make_simple_graph();
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_validate_no_start_node() {
        let mut graph = DefinitionGraph::new("Bad", OperatorId(1));
        graph.add_node(Node::end("end")).unwrap();

        assert!(matches!(graph.validate(), Err(FlowError::Configuration(_))));
    }

    #[test]
    fn test_validate_two_start_nodes() {
        let mut graph = make_simple_graph();
        graph.add_node(Node::start("start-2")).unwrap();

        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("exactly one start node"));
    }

    #[test]
    fn test_validate_unreachable_node() {
        let mut graph = make_simple_graph();
        graph
            .add_node(Node::approval("island", "Island", ApprovalType::Or, [5]))
            .unwrap();

        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }

    #[test]
    fn test_validate_approval_without_operators() {
        let mut graph = DefinitionGraph::new("Empty", OperatorId(1));
        graph.add_node(Node::start("start")).unwrap();
        graph
            .add_node(Node::new("review", "Review", NodeType::Approval))
            .unwrap();
        graph.add_node(Node::end("end")).unwrap();
        graph.connect("start", "review").unwrap();
        graph.connect("review", "end").unwrap();

        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_cycles_are_allowed() {
        let mut graph = make_simple_graph();
        graph
            .add_relation(Relation::reject(
                RelationId::new("review-back"),
                NodeId::new("review"),
                NodeId::new("start"),
            ))
            .unwrap();

        assert!(graph.validate().is_ok());
        assert_eq!(graph.incoming(&NodeId::new("start")).len(), 1);
    }

    #[test]
    fn test_duplicate_node_id() {
        let mut graph = make_simple_graph();
        let result = graph.add_node(Node::end("review"));
        assert!(matches!(result, Err(FlowError::Configuration(_))));
    }

    #[test]
    fn test_relation_to_unknown_node() {
        let mut graph = make_simple_graph();
        let result = graph.connect("review", "nowhere");
        assert!(matches!(result, Err(FlowError::Configuration(_))));
    }

    #[test]
    fn test_outgoing_by_kind() {
        let mut graph = make_simple_graph();
        graph
            .add_relation(Relation::reject(
                RelationId::new("back"),
                NodeId::new("review"),
                NodeId::new("start"),
            ))
            .unwrap();

        let review = NodeId::new("review");
        assert_eq!(graph.outgoing(&review).len(), 2);
        assert_eq!(graph.outgoing_of_kind(&review, RelationKind::Pass).len(), 1);
        assert_eq!(
            graph.outgoing_of_kind(&review, RelationKind::Reject)[0].target,
            NodeId::new("start")
        );
    }

    #[test]
    fn test_node_constructors() {
        let start = Node::start("s");
        assert_eq!(start.node_type, NodeType::Start);
        assert_eq!(start.code, "s");
        assert!(!start.is_approval());

        let approval = Node::approval("a", "Approve", ApprovalType::Sequential, [3, 1, 2])
            .with_code("FIN-01")
            .with_callback("budget-check");
        assert!(approval.is_approval());
        assert_eq!(approval.code, "FIN-01");
        assert_eq!(
            approval.assignment,
            OperatorAssignment::Static(vec![OperatorId(3), OperatorId(1), OperatorId(2)])
        );

        assert!(Node::condition("c", "Amount?").is_pass_through());
    }

    #[test]
    fn test_lookup_by_code() {
        let graph = make_simple_graph();
        assert_eq!(graph.node_by_code("review").unwrap().name, "Manager Review");
        assert_eq!(graph.node_index(&NodeId::new("end")), Some(2));
    }

    #[test]
    fn test_graph_id() {
        let id = GraphId::generate();
        assert!(!id.0.is_empty());
        assert!(id.short().len() <= 8);
        assert_eq!(format!("{}", GraphId::new("leave")), "leave");
    }
}
