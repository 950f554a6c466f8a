//! Approval resolver: who must act at a node, and whether they have
//!
//! The resolver turns a node's operator assignment into the concrete list
//! of required operators (delegation applied), then evaluates the node's
//! consensus rule against the decisions collected during the current visit.

use crate::directory::OperatorDirectory;
use flow_types::{
    ApprovalType, BindData, Decision, FlowError, FlowResult, Node, OperatorAssignment, OperatorId,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Assignment expression naming the record creator
pub const CREATOR_EXPRESSION: &str = "creator";

/// Tri-state outcome of an approval node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// More decisions are needed
    Pending,
    Approved,
    Rejected,
}

/// Resolves required operators and evaluates consensus
#[derive(Clone)]
pub struct ApprovalResolver {
    directory: Arc<dyn OperatorDirectory>,
}

impl ApprovalResolver {
    pub fn new(directory: Arc<dyn OperatorDirectory>) -> Self {
        Self { directory }
    }

    /// The operators required at a node, in assignment order, delegation applied
    pub fn required_operators(
        &self,
        node: &Node,
        creator: OperatorId,
        data: &BindData,
    ) -> FlowResult<Vec<OperatorId>> {
        let assigned = match &node.assignment {
            OperatorAssignment::Static(ids) => ids.clone(),
            OperatorAssignment::Expression(expr) => self.evaluate_expression(node, expr, creator, data)?,
        };

        let mut seen = HashSet::new();
        let mut required = Vec::with_capacity(assigned.len());
        for id in assigned {
            let effective = self.delegate_of(id)?;
            if seen.insert(effective) {
                required.push(effective);
            }
        }

        if required.is_empty() {
            return Err(FlowError::UnresolvedAssignment {
                node: node.id.clone(),
                reason: "no operators assigned".into(),
            });
        }
        Ok(required)
    }

    /// Follow an operator's delegation chain to whoever currently holds the authority
    pub fn delegate_of(&self, id: OperatorId) -> FlowResult<OperatorId> {
        let mut chain = vec![id];
        let mut current = self
            .directory
            .find_by_id(id)
            .ok_or(FlowError::OperatorNotFound(id))?;

        while let Some(next) = current.delegate {
            if chain.contains(&next) {
                chain.push(next);
                let path: Vec<String> = chain.iter().map(|o| o.to_string()).collect();
                return Err(FlowError::Configuration(format!(
                    "delegation cycle: {}",
                    path.join(" -> ")
                )));
            }
            chain.push(next);
            current = self
                .directory
                .find_by_id(next)
                .ok_or(FlowError::OperatorNotFound(next))?;
        }

        if chain.len() > 1 {
            debug!(operator = %id, delegate = %current.id, hops = chain.len() - 1, "Delegation applied");
        }
        Ok(current.id)
    }

    /// Resolve a dynamic assignment: `creator`, or a dotted path into the bound data
    fn evaluate_expression(
        &self,
        node: &Node,
        expr: &str,
        creator: OperatorId,
        data: &BindData,
    ) -> FlowResult<Vec<OperatorId>> {
        let expr = expr.trim();
        if expr == CREATOR_EXPRESSION {
            return Ok(vec![creator]);
        }

        let unresolved = |reason: String| FlowError::UnresolvedAssignment {
            node: node.id.clone(),
            reason,
        };

        let value = data
            .lookup(expr)
            .ok_or_else(|| unresolved(format!("'{}' not found in bound data", expr)))?;

        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|v| {
                    as_operator_id(v).ok_or_else(|| {
                        unresolved(format!("'{}' contains a non-operator value {}", expr, v))
                    })
                })
                .collect(),
            v => as_operator_id(v)
                .map(|id| vec![id])
                .ok_or_else(|| unresolved(format!("'{}' is not an operator id: {}", expr, v))),
        }
    }

    /// Assess a node against the decisions collected so far in this visit
    pub fn assess(
        &self,
        node: &Node,
        creator: OperatorId,
        data: &BindData,
        decisions: &[(OperatorId, Decision)],
    ) -> FlowResult<ApprovalState> {
        let required = self.required_operators(node, creator, data)?;
        Ok(ApprovalState::new(node.approval_type, required, decisions))
    }
}

fn as_operator_id(value: &serde_json::Value) -> Option<OperatorId> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(OperatorId),
        serde_json::Value::String(s) => s.trim().parse().ok().map(OperatorId),
        _ => None,
    }
}

// ── Approval State ───────────────────────────────────────────────────

/// The required operators of a node and the decisions they made
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalState {
    pub approval_type: ApprovalType,
    /// Required operators, in assignment order
    pub required: Vec<OperatorId>,
    /// First decision of each required operator, in the order made
    pub decisions: Vec<(OperatorId, Decision)>,
}

impl ApprovalState {
    pub fn new(
        approval_type: ApprovalType,
        required: Vec<OperatorId>,
        decisions: &[(OperatorId, Decision)],
    ) -> Self {
        let mut seen = HashSet::new();
        let decisions = decisions
            .iter()
            .filter(|(op, d)| *d != Decision::None && required.contains(op) && seen.insert(*op))
            .copied()
            .collect();
        Self {
            approval_type,
            required,
            decisions,
        }
    }

    /// Record one more decision and return the new state
    pub fn with_decision(&self, operator: OperatorId, decision: Decision) -> Self {
        let mut decisions = self.decisions.clone();
        decisions.push((operator, decision));
        Self::new(self.approval_type, self.required.clone(), &decisions)
    }

    fn decision_of(&self, operator: OperatorId) -> Option<Decision> {
        self.decisions
            .iter()
            .find(|(op, _)| *op == operator)
            .map(|(_, d)| *d)
    }

    fn count(&self, decision: Decision) -> usize {
        self.decisions.iter().filter(|(_, d)| *d == decision).count()
    }

    /// Evaluate the consensus rule
    pub fn status(&self) -> ApprovalStatus {
        if self.required.is_empty() {
            return ApprovalStatus::Pending;
        }
        let approvals = self.count(Decision::Approve);
        let rejections = self.count(Decision::Reject);

        match self.approval_type {
            ApprovalType::And | ApprovalType::Sequential => {
                if rejections > 0 {
                    ApprovalStatus::Rejected
                } else if approvals == self.required.len() {
                    ApprovalStatus::Approved
                } else {
                    ApprovalStatus::Pending
                }
            }
            ApprovalType::Or => {
                if approvals > 0 {
                    ApprovalStatus::Approved
                } else if rejections == self.required.len() {
                    ApprovalStatus::Rejected
                } else {
                    ApprovalStatus::Pending
                }
            }
        }
    }

    /// The next operator in order, for sequential nodes
    pub fn next_in_order(&self) -> Option<OperatorId> {
        self.required
            .iter()
            .copied()
            .find(|op| self.decision_of(*op).is_none())
    }

    /// Whether an operator may decide now
    pub fn can_act(&self, operator: OperatorId) -> bool {
        if self.status() != ApprovalStatus::Pending {
            return false;
        }
        match self.approval_type {
            ApprovalType::And | ApprovalType::Or => {
                self.required.contains(&operator) && self.decision_of(operator).is_none()
            }
            ApprovalType::Sequential => self.next_in_order() == Some(operator),
        }
    }

    /// Operators still expected to act
    pub fn pending_holders(&self) -> Vec<OperatorId> {
        if self.status() != ApprovalStatus::Pending {
            return Vec::new();
        }
        match self.approval_type {
            ApprovalType::And | ApprovalType::Or => self
                .required
                .iter()
                .copied()
                .filter(|op| self.decision_of(*op).is_none())
                .collect(),
            ApprovalType::Sequential => self.next_in_order().into_iter().collect(),
        }
    }
}
