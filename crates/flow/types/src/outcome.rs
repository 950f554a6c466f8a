//! Values returned by per-node callbacks
//!
//! `NodeResult` and `OperatorResult` veto an action; `MessageResult`
//! rides along with a successful one.

use crate::OperatorId;
use serde::{Deserialize, Serialize};

/// A callback's verdict that the action is not acceptable at a node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResult {
    /// Code of the offending node
    pub node_code: String,
}

impl NodeResult {
    pub fn new(node_code: impl Into<String>) -> Self {
        Self {
            node_code: node_code.into(),
        }
    }
}

/// A callback's verdict naming the operators that block the action
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorResult {
    pub operator_ids: Vec<OperatorId>,
}

impl OperatorResult {
    pub fn new(operator_ids: impl IntoIterator<Item = OperatorId>) -> Self {
        Self {
            operator_ids: operator_ids.into_iter().collect(),
        }
    }
}

/// One labelled line of a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageItem {
    pub label: String,
    pub value: String,
}

/// A notification attached to a successful outcome
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResult {
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<MessageItem>,
    /// Whether the recipient may dismiss the message
    pub closeable: bool,
}

impl MessageResult {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
            closeable: true,
        }
    }

    pub fn with_item(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.push(MessageItem {
            label: label.into(),
            value: value.into(),
        });
        self
    }

    pub fn sticky(mut self) -> Self {
        self.closeable = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder() {
        let msg = MessageResult::new("Budget exceeded")
            .with_item("limit", "1000")
            .with_item("requested", "1500")
            .sticky();

        assert_eq!(msg.items.len(), 2);
        assert_eq!(msg.items[1].label, "requested");
        assert!(!msg.closeable);
    }

    #[test]
    fn test_operator_result() {
        let r = OperatorResult::new([OperatorId(3), OperatorId(4)]);
        assert_eq!(r.operator_ids, vec![OperatorId(3), OperatorId(4)]);
    }
}
