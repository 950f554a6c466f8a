//! Execution records: the append-only history of a flow instance
//!
//! Every successful mutating action appends one [`ExecutionRecord`] to the
//! instance's [`Trail`]. The latest entry is the current state; everything
//! before it is the audit history. Entries are never edited.

use crate::{
    BindData, Decision, FlowError, FlowResult, GraphId, NodeId, OperatorId, Opinion,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Record Identifier ────────────────────────────────────────────────

/// Unique identifier for a flow instance
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
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

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Status & Action ──────────────────────────────────────────────────

/// Status of a flow instance as of one trail entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Being prepared by its creator at the start node
    Draft,
    /// Waiting for operators at an approval node
    Pending,
    /// Reached an end node
    Approved,
    /// Rejected with no rejection relation to follow
    Rejected,
    /// Withdrawn by its creator before anyone acted
    Recalled,
    /// Closed administratively
    Closed,
}

impl RecordStatus {
    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Recalled | Self::Closed
        )
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "DRAFT",
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Recalled => "RECALLED",
            Self::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// The action that produced a trail entry (or was attempted)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowAction {
    Create,
    Save,
    Submit,
    Urge,
    Recall,
    Postpone,
    Close,
}

impl std::fmt::Display for FlowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Save => "save",
            Self::Submit => "submit",
            Self::Urge => "urge",
            Self::Recall => "recall",
            Self::Postpone => "postpone",
            Self::Close => "close",
        };
        f.write_str(s)
    }
}

// ── Execution Record ─────────────────────────────────────────────────

/// One entry of an instance's trail
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Position in the trail, starting at 0; doubles as the optimistic version
    pub sequence: u64,
    /// The instance this entry belongs to
    pub record_id: RecordId,
    /// Graph the instance runs on
    pub graph_id: GraphId,
    /// Graph version the instance is pinned to
    pub graph_version: u32,
    /// Node the instance rests at after this entry
    pub node_id: NodeId,
    /// Sequence of the entry that entered `node_id`
    pub visit: u64,
    /// Instance status after this entry
    pub status: RecordStatus,
    /// The action that produced this entry
    pub action: FlowAction,
    /// Who created the instance
    pub creator: OperatorId,
    /// Who performed the action
    pub operator: OperatorId,
    /// Operators expected to act next
    pub holders: Vec<OperatorId>,
    /// Opinion attached to the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opinion: Option<Opinion>,
    /// Business data snapshot as of this entry
    pub data: BindData,
    /// Times the pending instance has been postponed
    pub postponed: u32,
    /// Nodes traversed by this transition, ending at `node_id`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<NodeId>,
    /// When the instance was created
    pub created_at: DateTime<Utc>,
    /// When this entry was appended
    pub updated_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Whether this entry entered its node (rather than staying at it)
    pub fn enters_node(&self) -> bool {
        self.visit == self.sequence
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The decision carried by this entry, if any
    pub fn decision(&self) -> Decision {
        self.opinion
            .as_ref()
            .map(|o| o.decision)
            .unwrap_or_default()
    }
}

// ── Trail ────────────────────────────────────────────────────────────

/// The ordered, append-only history of one instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trail {
    record_id: RecordId,
    entries: Vec<ExecutionRecord>,
}

impl Trail {
    /// An empty trail for a new instance
    pub fn new(record_id: RecordId) -> Self {
        Self {
            record_id,
            entries: Vec::new(),
        }
    }

    /// Rebuild a trail from stored entries, checking its invariants
    pub fn from_records(record_id: RecordId, entries: Vec<ExecutionRecord>) -> FlowResult<Self> {
        let mut trail = Self::new(record_id);
        for entry in entries {
            trail.push(entry)?;
        }
        Ok(trail)
    }

    /// Append an entry; it must be the next sequence and follow a non-terminal entry
    pub fn push(&mut self, entry: ExecutionRecord) -> FlowResult<()> {
        if entry.record_id != self.record_id {
            return Err(FlowError::InvalidState(format!(
                "entry for record {} appended to trail of {}",
                entry.record_id, self.record_id
            )));
        }
        let expected = self.next_sequence();
        if entry.sequence != expected {
            return Err(FlowError::ConcurrentModification {
                record: self.record_id.clone(),
                expected,
                found: entry.sequence,
            });
        }
        if let Some(last) = self.current() {
            if last.is_terminal() {
                return Err(FlowError::InvalidState(format!(
                    "record {} is already {}",
                    self.record_id, last.status
                )));
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    /// The latest entry: the current state of the instance
    pub fn current(&self) -> Option<&ExecutionRecord> {
        self.entries.last()
    }

    /// The first entry (the creation)
    pub fn first(&self) -> Option<&ExecutionRecord> {
        self.entries.first()
    }

    /// The entry with a given sequence
    pub fn entry(&self, sequence: u64) -> Option<&ExecutionRecord> {
        usize::try_from(sequence)
            .ok()
            .and_then(|i| self.entries.get(i))
    }

    /// Sequence the next appended entry must carry
    pub fn next_sequence(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ExecutionRecord] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.entries.iter()
    }

    /// Entries before `sequence`: the history that entry was built on
    pub fn history_before(&self, sequence: u64) -> &[ExecutionRecord] {
        let end = (sequence as usize).min(self.entries.len());
        &self.entries[..end]
    }

    /// Decisions made at a node during one visit, oldest first
    pub fn decisions_in_visit(&self, node_id: &NodeId, visit: u64) -> Vec<(OperatorId, Decision)> {
        self.entries
            .iter()
            .filter(|e| {
                &e.node_id == node_id
                    && e.visit == visit
                    && e.sequence > visit
                    && e.action == FlowAction::Submit
            })
            .filter_map(|e| match e.decision() {
                Decision::None => None,
                d => Some((e.operator, d)),
            })
            .collect()
    }

    /// The entry that first made the instance pending
    pub fn first_pending(&self) -> Option<&ExecutionRecord> {
        self.entries
            .iter()
            .find(|e| e.status == RecordStatus::Pending)
    }
}
