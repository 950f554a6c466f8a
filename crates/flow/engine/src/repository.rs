//! Persistence interfaces and their in-memory implementations
//!
//! Graphs are stored in their binary codec form; trails are stored as
//! append-only entry lists. Appending is a compare-and-swap on the
//! entry's sequence, so two writers racing on one record cannot both win.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flow_types::{
    DefinitionGraph, ExecutionRecord, FlowError, FlowResult, GraphId, RecordId, Trail,
};
use tracing::trace;

/// Storage for published definition graphs
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Store a published graph; an existing (id, version) is never overwritten
    async fn save_graph(&self, graph: &DefinitionGraph) -> FlowResult<()>;

    /// Load one version of a graph
    async fn load_graph(&self, id: &GraphId, version: u32) -> FlowResult<Option<DefinitionGraph>>;

    /// Highest published version of a graph
    async fn latest_version(&self, id: &GraphId) -> FlowResult<Option<u32>>;
}

/// Storage for execution trails
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load the full trail of an instance
    async fn load_trail(&self, id: &RecordId) -> FlowResult<Option<Trail>>;

    /// Append an entry whose `sequence` must equal the current trail length
    ///
    /// Fails with `ConcurrentModification` if another writer appended first.
    async fn append_record(&self, record: ExecutionRecord) -> FlowResult<()>;
}

// ── In-memory graph store ────────────────────────────────────────────

/// In-memory graph store holding encoded graphs
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    graphs: DashMap<(GraphId, u32), Bytes>,
    latest: DashMap<GraphId, u32>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw encoded form of a stored graph
    pub fn raw(&self, id: &GraphId, version: u32) -> Option<Bytes> {
        self.graphs.get(&(id.clone(), version)).map(|b| b.clone())
    }

    pub fn count(&self) -> usize {
        self.graphs.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn save_graph(&self, graph: &DefinitionGraph) -> FlowResult<()> {
        let encoded = flow_codec::encode(graph)?;

        match self.graphs.entry((graph.id.clone(), graph.version)) {
            Entry::Occupied(_) => {
                return Err(FlowError::Configuration(format!(
                    "graph {} version {} is already published",
                    graph.id, graph.version
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(encoded);
            }
        }

        self.latest
            .entry(graph.id.clone())
            .and_modify(|v| *v = (*v).max(graph.version))
            .or_insert(graph.version);

        trace!(graph_id = %graph.id, version = graph.version, "Graph stored");
        Ok(())
    }

    async fn load_graph(&self, id: &GraphId, version: u32) -> FlowResult<Option<DefinitionGraph>> {
        let bytes = match self.raw(id, version) {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        Ok(Some(flow_codec::decode(&bytes)?))
    }

    async fn latest_version(&self, id: &GraphId) -> FlowResult<Option<u32>> {
        Ok(self.latest.get(id).map(|v| *v))
    }
}

// ── In-memory record store ───────────────────────────────────────────

/// In-memory record store
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    trails: DashMap<RecordId, Trail>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances
    pub fn count(&self) -> usize {
        self.trails.len()
    }

    /// Ids of all instances
    pub fn record_ids(&self) -> Vec<RecordId> {
        self.trails.iter().map(|t| t.key().clone()).collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn load_trail(&self, id: &RecordId) -> FlowResult<Option<Trail>> {
        Ok(self.trails.get(id).map(|t| t.clone()))
    }

    async fn append_record(&self, record: ExecutionRecord) -> FlowResult<()> {
        let record_id = record.record_id.clone();
        let sequence = record.sequence;

        match self.trails.entry(record_id.clone()) {
            Entry::Occupied(mut trail) => trail.get_mut().push(record)?,
            Entry::Vacant(slot) => {
                let mut trail = Trail::new(record_id.clone());
                trail.push(record)?;
                slot.insert(trail);
            }
        }

        trace!(record_id = %record_id, sequence, "Execution record appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use flow_types::{BindData, FlowAction, Node, NodeId, OperatorId, RecordStatus};

    fn graph(version: u32) -> DefinitionGraph {
        let mut g = DefinitionGraph::new("Store", OperatorId(1)).with_id(GraphId::new("store"));
        g.version = version;
        g.created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        g.updated_at = g.created_at;
        g.add_node(Node::start("start")).unwrap();
        g.add_node(Node::end("end")).unwrap();
        g.connect("start", "end").unwrap();
        g
    }

    fn entry(sequence: u64, status: RecordStatus) -> ExecutionRecord {
        let now = Utc::now();
        ExecutionRecord {
            sequence,
            record_id: RecordId::new("r-1"),
            graph_id: GraphId::new("store"),
            graph_version: 1,
            node_id: NodeId::new("start"),
            visit: 0,
            status,
            action: FlowAction::Save,
            creator: OperatorId(1),
            operator: OperatorId(1),
            holders: vec![OperatorId(1)],
            opinion: None,
            data: BindData::default(),
            postponed: 0,
            route: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_graph_store_round_trip() {
        let store = InMemoryGraphStore::new();
        store.save_graph(&graph(1)).await.unwrap();
        store.save_graph(&graph(2)).await.unwrap();

        let id = GraphId::new("store");
        assert_eq!(store.latest_version(&id).await.unwrap(), Some(2));
        assert_eq!(store.load_graph(&id, 1).await.unwrap().unwrap(), graph(1));
        assert!(store.load_graph(&id, 3).await.unwrap().is_none());
        assert_eq!(&store.raw(&id, 2).unwrap()[..4], b"AFGR");
    }

    #[tokio::test]
    async fn test_published_version_is_immutable() {
        let store = InMemoryGraphStore::new();
        store.save_graph(&graph(1)).await.unwrap();

        let mut changed = graph(1);
        changed.title = "Changed".into();
        assert!(matches!(
            store.save_graph(&changed).await,
            Err(FlowError::Configuration(_))
        ));
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_append_is_compare_and_swap() {
        let store = InMemoryRecordStore::new();
        store.append_record(entry(0, RecordStatus::Draft)).await.unwrap();
        store.append_record(entry(1, RecordStatus::Draft)).await.unwrap();

        // A writer that loaded the trail at length 1 loses
        let stale = store.append_record(entry(1, RecordStatus::Draft)).await;
        assert!(matches!(
            stale,
            Err(FlowError::ConcurrentModification { .. })
        ));

        let trail = store.load_trail(&RecordId::new("r-1")).await.unwrap().unwrap();
        assert_eq!(trail.len(), 2);
    }

    #[tokio::test]
    async fn test_first_append_must_start_at_zero() {
        let store = InMemoryRecordStore::new();
        assert!(store.append_record(entry(3, RecordStatus::Draft)).await.is_err());
        assert_eq!(store.count(), 0);
    }

    #[tokio::test]
    async fn test_terminal_trail_is_closed() {
        let store = InMemoryRecordStore::new();
        store.append_record(entry(0, RecordStatus::Draft)).await.unwrap();
        store.append_record(entry(1, RecordStatus::Closed)).await.unwrap();

        assert!(matches!(
            store.append_record(entry(2, RecordStatus::Draft)).await,
            Err(FlowError::InvalidState(_))
        ));
        assert_eq!(store.record_ids(), vec![RecordId::new("r-1")]);
    }
}
