//! Router: picks the next resting node of an instance
//!
//! From a node that has passed (or been rejected) the router follows the
//! first matching relation of the right kind, then keeps going through
//! CONDITION nodes until it reaches a node the instance can rest at:
//! an APPROVAL node (pending), an END node (approved) or the START node
//! (back to draft).

use crate::guard_evaluator::{EvaluationContext, GuardEvaluator, GuardResult};
use flow_types::{
    DefinitionGraph, FlowError, FlowResult, NodeId, NodeType, Relation, RelationKind,
};
use tracing::debug;

/// Where a transition ends up
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    /// The resting node
    pub target: NodeId,
    /// Its type
    pub target_type: NodeType,
    /// Nodes traversed after the source, ending with `target`
    pub path: Vec<NodeId>,
}

/// Routes instances along relations
#[derive(Clone, Debug)]
pub struct Router {
    guard_evaluator: GuardEvaluator,
    max_hops: usize,
}

impl Router {
    pub fn new(max_hops: usize) -> Self {
        Self {
            guard_evaluator: GuardEvaluator::new(),
            max_hops,
        }
    }

    /// Route along pass relations; no match is an error
    pub fn route_pass(
        &self,
        graph: &DefinitionGraph,
        from: &NodeId,
        context: &EvaluationContext,
    ) -> FlowResult<Route> {
        let relation = self
            .first_match(graph, from, RelationKind::Pass, context)
            .ok_or_else(|| FlowError::NoMatchingRelation(from.clone()))?;
        self.walk(graph, relation, context)
    }

    /// Route along rejection relations; `None` means the rejection is final
    pub fn route_reject(
        &self,
        graph: &DefinitionGraph,
        from: &NodeId,
        context: &EvaluationContext,
    ) -> FlowResult<Option<Route>> {
        match self.first_match(graph, from, RelationKind::Reject, context) {
            Some(relation) => self.walk(graph, relation, context).map(Some),
            None => Ok(None),
        }
    }

    /// The first relation of a kind, in declaration order, whose guard holds
    pub fn first_match<'g>(
        &self,
        graph: &'g DefinitionGraph,
        from: &NodeId,
        kind: RelationKind,
        context: &EvaluationContext,
    ) -> Option<&'g Relation> {
        graph.outgoing_of_kind(from, kind).into_iter().find(|r| {
            let result = self.guard_evaluator.evaluate(r.guard.as_deref(), context);
            if let GuardResult::NotSatisfied { reason } = &result {
                debug!(relation = %r.id, reason = %reason, "Guard not satisfied");
            }
            result.is_satisfied()
        })
    }

    fn walk(
        &self,
        graph: &DefinitionGraph,
        first: &Relation,
        context: &EvaluationContext,
    ) -> FlowResult<Route> {
        let mut path = Vec::new();
        let mut relation = first;

        loop {
            let target = graph.node(&relation.target).ok_or_else(|| {
                FlowError::Configuration(format!(
                    "relation '{}' targets unknown node '{}'",
                    relation.id, relation.target
                ))
            })?;
            path.push(target.id.clone());

            if path.len() > self.max_hops {
                return Err(FlowError::Configuration(format!(
                    "routing exceeded {} hops (cycle through condition nodes near '{}')",
                    self.max_hops, target.id
                )));
            }

            match target.node_type {
                NodeType::Condition => {
                    relation = self
                        .first_match(graph, &target.id, RelationKind::Pass, context)
                        .ok_or_else(|| FlowError::NoMatchingRelation(target.id.clone()))?;
                }
                NodeType::Start | NodeType::Approval | NodeType::End => {
                    return Ok(Route {
                        target: target.id.clone(),
                        target_type: target.node_type,
                        path,
                    });
                }
            }
        }
    }
}
