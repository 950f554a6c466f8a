//! Operators: the humans who act on approval flows

use serde::{Deserialize, Serialize};

/// Numeric operator (user) identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatorId(pub u64);

impl std::fmt::Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OperatorId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An operator as known to the operator directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    /// Operator identifier
    pub id: OperatorId,
    /// Display name
    pub name: String,
    /// Flow managers may act on any record regardless of assignment
    pub flow_manager: bool,
    /// The operator currently holding this operator's authority, if delegated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<OperatorId>,
}

impl Operator {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: OperatorId(id),
            name: name.into(),
            flow_manager: false,
            delegate: None,
        }
    }

    pub fn manager(mut self) -> Self {
        self.flow_manager = true;
        self
    }

    pub fn delegating_to(mut self, delegate: u64) -> Self {
        self.delegate = Some(OperatorId(delegate));
        self
    }

    pub fn is_flow_manager(&self) -> bool {
        self.flow_manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_builders() {
        let alice = Operator::new(1, "Alice").manager();
        assert!(alice.is_flow_manager());
        assert!(alice.delegate.is_none());

        let bob = Operator::new(2, "Bob").delegating_to(3);
        assert!(!bob.is_flow_manager());
        assert_eq!(bob.delegate, Some(OperatorId(3)));
        assert_eq!(bob.id.to_string(), "2");
    }

    #[test]
    fn test_operator_id_is_transparent_in_json() {
        let json = serde_json::to_string(&OperatorId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
