//! Operator directory: who the operators are and whom they delegate to

use dashmap::DashMap;
use flow_types::{Operator, OperatorId};

/// Resolves operators by id
///
/// Lookups are synchronous: directories are expected to be in-process
/// caches in front of whatever user store backs them.
pub trait OperatorDirectory: Send + Sync {
    fn find_by_id(&self, id: OperatorId) -> Option<Operator>;
}

/// In-memory operator directory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    operators: DashMap<OperatorId, Operator>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from a list of operators
    pub fn with_operators(operators: impl IntoIterator<Item = Operator>) -> Self {
        let directory = Self::new();
        for operator in operators {
            directory.insert(operator);
        }
        directory
    }

    /// Add or replace an operator
    pub fn insert(&self, operator: Operator) {
        self.operators.insert(operator.id, operator);
    }

    /// Set (or clear) an operator's delegate; returns false if unknown
    pub fn set_delegate(&self, id: OperatorId, delegate: Option<OperatorId>) -> bool {
        match self.operators.get_mut(&id) {
            Some(mut operator) => {
                operator.delegate = delegate;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl OperatorDirectory for InMemoryDirectory {
    fn find_by_id(&self, id: OperatorId) -> Option<Operator> {
        self.operators.get(&id).map(|o| o.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_and_delegate() {
        let directory = InMemoryDirectory::with_operators([
            Operator::new(1, "Alice"),
            Operator::new(2, "Bob"),
        ]);

        assert_eq!(directory.len(), 2);
        assert_eq!(directory.find_by_id(OperatorId(1)).unwrap().name, "Alice");
        assert!(directory.find_by_id(OperatorId(3)).is_none());

        assert!(directory.set_delegate(OperatorId(1), Some(OperatorId(2))));
        assert_eq!(
            directory.find_by_id(OperatorId(1)).unwrap().delegate,
            Some(OperatorId(2))
        );
        assert!(!directory.set_delegate(OperatorId(9), None));
    }
}
