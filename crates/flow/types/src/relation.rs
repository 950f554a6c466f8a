//! Relations: directed, optionally guarded transitions between nodes
//!
//! A relation names its endpoints by node id. Outgoing relations of a node
//! are tried in declaration order; the first whose guard holds wins, and an
//! unguarded relation always holds. REJECT relations are only considered
//! when an approval node is rejected.

use crate::NodeId;
use serde::{Deserialize, Serialize};

/// Unique identifier for a relation within a graph
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationId(pub String);

impl RelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directed edge of the definition graph
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Unique identifier within the graph
    pub id: RelationId,
    /// Source node
    pub source: NodeId,
    /// Target node
    pub target: NodeId,
    /// Condition over the bound data; `None` always matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    /// Whether this relation is followed on pass or on rejection
    #[serde(default)]
    pub kind: RelationKind,
}

impl Relation {
    /// Create an unguarded pass relation
    pub fn pass(id: RelationId, source: NodeId, target: NodeId) -> Self {
        Self {
            id,
            source,
            target,
            guard: None,
            kind: RelationKind::Pass,
        }
    }

    /// Create an unguarded rejection relation
    pub fn reject(id: RelationId, source: NodeId, target: NodeId) -> Self {
        Self {
            id,
            source,
            target,
            guard: None,
            kind: RelationKind::Reject,
        }
    }

    /// Attach a guard condition
    pub fn when(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn is_guarded(&self) -> bool {
        self.guard.as_deref().is_some_and(|g| !g.trim().is_empty())
    }
}

/// When a relation is followed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Followed when the source node passes (approved, submitted, routed)
    #[default]
    Pass,
    /// Followed when an approval node is rejected
    Reject,
}
