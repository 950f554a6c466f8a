//! Scripted runs of a single instance against an in-memory engine

use anyhow::{Context, Result};
use flow_engine::{EngineConfig, FlowEngine, InMemoryDirectory, InMemoryGraphStore, InMemoryRecordStore};
use flow_types::{BindData, DefinitionGraph, Operator, OperatorId, Opinion, Trail};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// A scripted run: who exists, who launches, and what they do
#[derive(Debug, Deserialize)]
pub struct Script {
    pub operators: Vec<ScriptOperator>,
    pub creator: u64,
    #[serde(default)]
    pub data: BindData,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptOperator {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub manager: bool,
    #[serde(default)]
    pub delegate: Option<u64>,
}

/// One action in a script
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Step {
    Save {
        operator: u64,
        data: BindData,
    },
    Approve {
        operator: u64,
        #[serde(default)]
        advice: String,
    },
    Reject {
        operator: u64,
        #[serde(default)]
        advice: String,
    },
    Urge {
        operator: u64,
    },
    Recall {
        operator: u64,
    },
    Postpone {
        operator: u64,
    },
    Close {
        operator: u64,
        #[serde(default)]
        advice: String,
    },
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    fn directory(&self) -> InMemoryDirectory {
        InMemoryDirectory::with_operators(self.operators.iter().map(|o| {
            let mut operator = Operator::new(o.id, o.name.clone());
            operator.flow_manager = o.manager;
            operator.delegate = o.delegate.map(OperatorId);
            operator
        }))
    }
}

/// Create a draft, submit it, then apply each step; stops at the first failure
pub async fn run(config: EngineConfig, graph: DefinitionGraph, script: Script) -> Result<Trail> {
    let engine = FlowEngine::new(
        config,
        Arc::new(InMemoryGraphStore::new()),
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(script.directory()),
    );
    let graph = engine.publish(graph).await?;
    let creator = OperatorId(script.creator);

    let draft = engine
        .create(&graph.id, creator, script.data.clone(), "")
        .await?;
    let record_id = draft.record.record_id;
    engine
        .submit(&record_id, creator, None, Opinion::pass(""))
        .await?;

    for (index, step) in script.steps.into_iter().enumerate() {
        let result = match step {
            Step::Save { operator, data } => engine
                .save(&record_id, OperatorId(operator), data, "")
                .await
                .map(drop),
            Step::Approve { operator, advice } => engine
                .submit(&record_id, OperatorId(operator), None, Opinion::pass(advice))
                .await
                .map(drop),
            Step::Reject { operator, advice } => engine
                .submit(&record_id, OperatorId(operator), None, Opinion::reject(advice))
                .await
                .map(drop),
            Step::Urge { operator } => engine
                .urge(&record_id, OperatorId(operator))
                .await
                .map(|notice| println!("urged: {}", notice.message.title)),
            Step::Recall { operator } => engine
                .recall(&record_id, OperatorId(operator))
                .await
                .map(drop),
            Step::Postpone { operator } => engine
                .postpone(&record_id, OperatorId(operator))
                .await
                .map(drop),
            Step::Close { operator, advice } => engine
                .close(&record_id, OperatorId(operator), advice)
                .await
                .map(drop),
        };
        result.with_context(|| format!("step {} failed", index + 1))?;
    }

    Ok(engine.trail(&record_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_types::{ApprovalType, GraphId, Node, RecordStatus};

    fn graph() -> DefinitionGraph {
        let mut graph = DefinitionGraph::new("Review", OperatorId(1)).with_id(GraphId::new("review"));
        graph.add_node(Node::start("start")).unwrap();
        graph
            .add_node(Node::approval("review", "Review", ApprovalType::And, [2, 3]))
            .unwrap();
        graph.add_node(Node::end("end")).unwrap();
        graph.connect("start", "review").unwrap();
        graph.connect("review", "end").unwrap();
        graph
    }

    fn script(steps: &str) -> Script {
        serde_json::from_str(&format!(
            r#"{{
                "operators": [
                    {{"id": 1, "name": "Author"}},
                    {{"id": 2, "name": "Reviewer"}},
                    {{"id": 3, "name": "Editor", "manager": true}}
                ],
                "creator": 1,
                "steps": {}
            }}"#,
            steps
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_scripted_approval() {
        let script = script(
            r#"[
                {"action": "urge", "operator": 1},
                {"action": "approve", "operator": 2},
                {"action": "approve", "operator": 3, "advice": "ship it"}
            ]"#,
        );
        let trail = run(EngineConfig::default(), graph(), script).await.unwrap();

        assert_eq!(trail.len(), 4);
        assert_eq!(trail.current().unwrap().status, RecordStatus::Approved);
    }

    #[tokio::test]
    async fn test_failing_step_is_reported() {
        let script = script(r#"[{"action": "recall", "operator": 2}]"#);
        let err = run(EngineConfig::default(), graph(), script).await.unwrap_err();
        assert!(err.to_string().contains("step 1"));
    }
}
