//! Bound business data
//!
//! Every record carries a snapshot of the business entity it approves.
//! The engine never interprets it beyond guard evaluation and dynamic
//! operator assignment.

use crate::FlowResult;
use serde::{Deserialize, Serialize};

/// Snapshot of the business entity bound to a flow instance
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BindData {
    /// Identifier of the bound entity
    pub entity_id: i64,
    /// JSON snapshot taken at the time of the action
    pub snapshot: serde_json::Value,
}

impl BindData {
    pub fn new(entity_id: i64, snapshot: serde_json::Value) -> Self {
        Self {
            entity_id,
            snapshot,
        }
    }

    /// Build from any entity that knows how to snapshot itself
    pub fn of<E: BindEntity>(entity: &E) -> FlowResult<Self> {
        entity.to_bind_data()
    }

    /// Look up a dotted path (`applicant.manager`) in the snapshot
    pub fn lookup(&self, path: &str) -> Option<&serde_json::Value> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.snapshot, |value, segment| match value {
                serde_json::Value::Object(map) => map.get(segment),
                serde_json::Value::Array(items) => {
                    segment.parse::<usize>().ok().and_then(|i| items.get(i))
                }
                _ => None,
            })
    }
}

/// A business entity that can be bound to a flow instance
pub trait BindEntity: Serialize {
    /// Identifier of the entity
    fn entity_id(&self) -> i64;

    /// JSON snapshot of the entity
    fn to_snapshot(&self) -> FlowResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn to_bind_data(&self) -> FlowResult<BindData> {
        Ok(BindData::new(self.entity_id(), self.to_snapshot()?))
    }
}
