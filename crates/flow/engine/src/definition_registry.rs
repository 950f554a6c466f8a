//! Definition registry: publishes and caches definition graphs
//!
//! Graphs are immutable once published. Publishing a graph again assigns
//! it the next version; instances stay pinned to the version they started
//! on. Loaded graphs are cached as shared `Arc`s.

use crate::repository::GraphStore;
use chrono::Utc;
use dashmap::DashMap;
use flow_types::{DefinitionGraph, FlowError, FlowResult, GraphId};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Registry of published definition graphs
pub struct DefinitionRegistry {
    store: Arc<dyn GraphStore>,
    /// Published graphs, keyed by (id, version)
    cache: DashMap<(GraphId, u32), Arc<DefinitionGraph>>,
    /// Serialises version assignment
    publish_lock: Mutex<()>,
}

impl DefinitionRegistry {
    /// Create a registry in front of a graph store
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            publish_lock: Mutex::new(()),
        }
    }

    /// Publish a graph as the next version of its id
    ///
    /// Validates the graph before storing. Returns the published graph.
    pub async fn publish(&self, mut graph: DefinitionGraph) -> FlowResult<Arc<DefinitionGraph>> {
        graph.validate()?;

        let _guard = self.publish_lock.lock().await;
        let latest = self.store.latest_version(&graph.id).await?.unwrap_or(0);
        graph.version = latest + 1;
        graph.updated_at = Utc::now();

        self.store.save_graph(&graph).await?;

        let graph = Arc::new(graph);
        self.cache
            .insert((graph.id.clone(), graph.version), Arc::clone(&graph));

        tracing::info!(
            graph_id = %graph.id,
            version = graph.version,
            nodes = graph.node_count(),
            "Definition graph published"
        );
        Ok(graph)
    }

    /// Get one version of a graph
    pub async fn get(&self, id: &GraphId, version: u32) -> FlowResult<Arc<DefinitionGraph>> {
        let key = (id.clone(), version);
        if let Some(graph) = self.cache.get(&key) {
            return Ok(Arc::clone(graph.value()));
        }

        let graph = self
            .store
            .load_graph(id, version)
            .await?
            .ok_or_else(|| FlowError::GraphNotFound {
                id: id.clone(),
                version,
            })?;

        let graph = Arc::new(graph);
        self.cache.insert(key, Arc::clone(&graph));
        Ok(graph)
    }

    /// Get the latest published version of a graph
    pub async fn latest(&self, id: &GraphId) -> FlowResult<Arc<DefinitionGraph>> {
        let version = self
            .store
            .latest_version(id)
            .await?
            .ok_or_else(|| FlowError::GraphNotFound {
                id: id.clone(),
                version: 0,
            })?;
        self.get(id, version).await
    }

    /// Number of cached graph versions
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl std::fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryGraphStore;
    use flow_types::{Node, OperatorId};

    fn make_valid_graph(id: &str) -> DefinitionGraph {
        let mut graph = DefinitionGraph::new("Test Flow", OperatorId(1)).with_id(GraphId::new(id));
        graph.add_node(Node::start("start")).unwrap();
        graph.add_node(Node::end("end")).unwrap();
        graph.connect("start", "end").unwrap();
        graph
    }

    #[tokio::test]
    async fn test_publish_and_get() {
        let registry = DefinitionRegistry::new(Arc::new(InMemoryGraphStore::new()));
        let published = registry.publish(make_valid_graph("g")).await.unwrap();

        assert_eq!(published.version, 1);
        let fetched = registry.get(&GraphId::new("g"), 1).await.unwrap();
        assert!(Arc::ptr_eq(&published, &fetched));
    }

    #[tokio::test]
    async fn test_publish_invalid() {
        let registry = DefinitionRegistry::new(Arc::new(InMemoryGraphStore::new()));
        let graph = DefinitionGraph::new("Bad", OperatorId(1));

        assert!(registry.publish(graph).await.is_err());
        assert_eq!(registry.cached(), 0);
    }

    #[tokio::test]
    async fn test_republish_bumps_version() {
        let registry = DefinitionRegistry::new(Arc::new(InMemoryGraphStore::new()));
        registry.publish(make_valid_graph("g")).await.unwrap();
        let v2 = registry.publish(make_valid_graph("g")).await.unwrap();

        assert_eq!(v2.version, 2);
        assert_eq!(registry.latest(&GraphId::new("g")).await.unwrap().version, 2);
        assert_eq!(registry.get(&GraphId::new("g"), 1).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_loads_from_shared_store() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let writer = DefinitionRegistry::new(Arc::clone(&store));
        let reader = DefinitionRegistry::new(store);

        let published = writer.publish(make_valid_graph("shared")).await.unwrap();
        let loaded = reader.get(&GraphId::new("shared"), 1).await.unwrap();

        assert_eq!(*loaded, *published);
        assert_eq!(reader.cached(), 1);
    }

    #[tokio::test]
    async fn test_missing_graph() {
        let registry = DefinitionRegistry::new(Arc::new(InMemoryGraphStore::new()));
        let result = registry.get(&GraphId::new("nope"), 1).await;
        assert!(matches!(result, Err(FlowError::GraphNotFound { .. })));
        assert!(registry.latest(&GraphId::new("nope")).await.is_err());
    }
}
