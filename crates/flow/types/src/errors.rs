//! Error types for the Approval Flow layer

use crate::{GraphId, NodeId, NodeResult, OperatorId, OperatorResult, RecordId};

/// Errors that can occur in Approval Flow operations
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No outgoing relation of node '{0}' matches the bound data")]
    NoMatchingRelation(NodeId),

    #[error("Operator not found: {0}")]
    OperatorNotFound(OperatorId),

    #[error("Cannot resolve operators of node '{node}': {reason}")]
    UnresolvedAssignment { node: NodeId, reason: String },

    #[error("Postpone limit exceeded: {attempted} > {max}")]
    PostponeLimitExceeded { attempted: u32, max: u32 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Concurrent modification of record {record}: expected sequence {expected}, found {found}")]
    ConcurrentModification {
        record: RecordId,
        expected: u64,
        found: u64,
    },

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Graph not found: {id} (version {version})")]
    GraphNotFound { id: GraphId, version: u32 },

    #[error("Graph is disabled: {0}")]
    GraphDisabled(GraphId),

    #[error("Rejected at node '{}'", .0.node_code)]
    NodeRejected(NodeResult),

    #[error("Rejected because of operators {:?}", .0.operator_ids)]
    OperatorRejected(OperatorResult),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl FlowError {
    /// Failures meant to be shown to the acting operator as-is
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::NodeRejected(_) | Self::OperatorRejected(_))
    }

    /// Failures the caller may retry unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// Directory misses and unresolvable dynamic assignments
    pub fn is_operator_resolution(&self) -> bool {
        matches!(
            self,
            Self::OperatorNotFound(_) | Self::UnresolvedAssignment { .. }
        )
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        FlowError::Storage(format!("snapshot serialization: {}", e))
    }
}

/// Errors raised while decoding a binary definition graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("not a definition graph (bad magic)")]
    BadMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("truncated input: {needed} more byte(s) needed at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("invalid {field} tag {tag}")]
    InvalidTag { field: &'static str, tag: u8 },

    #[error("node index {index} out of range ({count} nodes)")]
    NodeIndexOutOfRange { index: u32, count: u32 },

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("invalid timestamp in {0}")]
    InvalidTimestamp(&'static str),

    #[error("{0} unexpected trailing byte(s)")]
    TrailingBytes(usize),
}

/// Result type alias for approval flow operations
pub type FlowResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let rejected = FlowError::NodeRejected(NodeResult::new("manager-review"));
        assert!(rejected.is_user_facing());
        assert!(!rejected.is_retryable());

        let conflict = FlowError::ConcurrentModification {
            record: RecordId::new("r-1"),
            expected: 3,
            found: 4,
        };
        assert!(conflict.is_retryable());
        assert!(!conflict.is_user_facing());

        assert!(FlowError::OperatorNotFound(OperatorId(9)).is_operator_resolution());
    }

    #[test]
    fn test_format_error_converts() {
        let err: FlowError = FormatError::UnsupportedVersion(7).into();
        assert!(matches!(
            err,
            FlowError::Format(FormatError::UnsupportedVersion(7))
        ));
        assert_eq!(err.to_string(), "Format error: unsupported format version 7");
    }
}
