//! Binary codec for definition graphs
//!
//! A graph is written as a header, a metadata block, a node table, a
//! relation table and a CRC32 trailer. Relations name their endpoints by
//! position in the node table, so every reference resolves back to the one
//! node entry on decode.
//!
//! ```text
//! [magic "AFGR":4][version:2][flags:2]
//! [metadata][nodes][relations]
//! [crc32:4]
//! ```
//!
//! All integers are little-endian. Strings are `[len:4][utf8]`; timestamps
//! are `[secs:8][nanos:4]`.

#![deny(unsafe_code)]

mod decode;
mod encode;

pub use decode::decode;
pub use encode::encode;
pub use flow_types::FormatError;

/// Magic bytes: "AFGR" (Approval Flow GRaph)
pub const GRAPH_MAGIC: [u8; 4] = *b"AFGR";
/// Current format version
pub const FORMAT_VERSION: u16 = 1;
/// Header size: magic(4) + version(2) + flags(2)
pub const HEADER_SIZE: usize = 8;
/// Trailer size: crc32(4)
pub const TRAILER_SIZE: usize = 4;

// ── Wire tags ────────────────────────────────────────────────────────

mod tag {
    use flow_types::{ApprovalType, FormatError, NodeType, RelationKind};

    pub const ASSIGN_STATIC: u8 = 0;
    pub const ASSIGN_EXPRESSION: u8 = 1;

    pub fn node_type(t: NodeType) -> u8 {
        match t {
            NodeType::Start => 0,
            NodeType::Approval => 1,
            NodeType::Condition => 2,
            NodeType::End => 3,
        }
    }

    pub fn to_node_type(tag: u8) -> Result<NodeType, FormatError> {
        match tag {
            0 => Ok(NodeType::Start),
            1 => Ok(NodeType::Approval),
            2 => Ok(NodeType::Condition),
            3 => Ok(NodeType::End),
            _ => Err(FormatError::InvalidTag {
                field: "node type",
                tag,
            }),
        }
    }

    pub fn approval_type(t: ApprovalType) -> u8 {
        match t {
            ApprovalType::And => 0,
            ApprovalType::Or => 1,
            ApprovalType::Sequential => 2,
        }
    }

    pub fn to_approval_type(tag: u8) -> Result<ApprovalType, FormatError> {
        match tag {
            0 => Ok(ApprovalType::And),
            1 => Ok(ApprovalType::Or),
            2 => Ok(ApprovalType::Sequential),
            _ => Err(FormatError::InvalidTag {
                field: "approval type",
                tag,
            }),
        }
    }

    pub fn relation_kind(k: RelationKind) -> u8 {
        match k {
            RelationKind::Pass => 0,
            RelationKind::Reject => 1,
        }
    }

    pub fn to_relation_kind(tag: u8) -> Result<RelationKind, FormatError> {
        match tag {
            0 => Ok(RelationKind::Pass),
            1 => Ok(RelationKind::Reject),
            _ => Err(FormatError::InvalidTag {
                field: "relation kind",
                tag,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use flow_types::{
        ApprovalType, DefinitionGraph, FlowError, GraphId, Node, NodeId, NodeType, OperatorAssignment,
        OperatorId, Relation, RelationId, RelationKind,
    };
    use proptest::prelude::*;

    fn leave_graph() -> DefinitionGraph {
        let mut graph = DefinitionGraph::new("Leave", OperatorId(7))
            .with_id(GraphId::new("leave"))
            .with_description("Annual leave über 5 Tage")
            .with_postponed_max(3);
        graph.version = 2;
        graph.created_at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        graph.updated_at = graph.created_at;

        graph.add_node(Node::start("start")).unwrap();
        graph.add_node(Node::condition("days", "Long leave?")).unwrap();
        graph
            .add_node(
                Node::approval("lead", "Team Lead", ApprovalType::Sequential, [10, 11])
                    .with_callback("check-balance"),
            )
            .unwrap();
        graph
            .add_node(
                Node::new("hr", "HR", NodeType::Approval)
                    .with_assignment(OperatorAssignment::expression("applicant.hr")),
            )
            .unwrap();
        graph.add_node(Node::end("end")).unwrap();

        graph.connect("start", "days").unwrap();
        graph
            .add_relation(
                Relation::pass(RelationId::new("long"), NodeId::new("days"), NodeId::new("hr"))
                    .when("days > 5"),
            )
            .unwrap();
        graph.connect("days", "lead").unwrap();
        graph.connect("lead", "end").unwrap();
        graph.connect("hr", "end").unwrap();
        graph
            .add_relation(Relation::reject(
                RelationId::new("hr-back"),
                NodeId::new("hr"),
                NodeId::new("days"),
            ))
            .unwrap();
        graph
    }

    #[test]
    fn test_round_trip() {
        let graph = leave_graph();
        let bytes = encode(&graph).unwrap();

        assert_eq!(&bytes[..4], b"AFGR");
        assert_eq!(decode(&bytes).unwrap(), graph);
    }

    #[test]
    fn test_relations_resolve_to_node_entries() {
        let decoded = decode(&encode(&leave_graph()).unwrap()).unwrap();

        for relation in &decoded.relations {
            assert!(decoded.node(&relation.source).is_some());
            assert!(decoded.node(&relation.target).is_some());
        }
        assert!(decoded.validate().is_ok());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut bytes = encode(&leave_graph()).unwrap().to_vec();
        bytes[4..6].copy_from_slice(&9u16.to_le_bytes());

        assert_eq!(decode(&bytes), Err(FormatError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = encode(&leave_graph()).unwrap().to_vec();
        bytes[0] = b'X';
        assert_eq!(decode(&bytes), Err(FormatError::BadMagic));
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = encode(&leave_graph()).unwrap().to_vec();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;

        assert!(matches!(
            decode(&bytes),
            Err(FormatError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncation_detected() {
        let bytes = encode(&leave_graph()).unwrap();

        assert!(matches!(
            decode(&bytes[..6]),
            Err(FormatError::Truncated { .. })
        ));
        // Cut the body: the checksum no longer matches what is left
        assert!(decode(&bytes[..bytes.len() - 10]).is_err());
        assert!(matches!(decode(&[]), Err(FormatError::Truncated { .. })));
    }

    #[test]
    fn test_relation_to_unknown_node_does_not_encode() {
        let mut graph = leave_graph();
        graph.relations.push(Relation::pass(
            RelationId::new("dangling"),
            NodeId::new("end"),
            NodeId::new("ghost"),
        ));

        assert!(matches!(encode(&graph), Err(FlowError::Configuration(_))));
    }

    #[test]
    fn test_format_error_lifts_into_flow_error() {
        let err: FlowError = decode(b"nope").unwrap_err().into();
        assert!(matches!(err, FlowError::Format(_)));
    }

    // ── Property: decode(encode(g)) == g ──

    fn arb_node_type() -> impl Strategy<Value = NodeType> {
        prop_oneof![
            Just(NodeType::Start),
            Just(NodeType::Approval),
            Just(NodeType::Condition),
            Just(NodeType::End),
        ]
    }

    fn arb_approval_type() -> impl Strategy<Value = ApprovalType> {
        prop_oneof![
            Just(ApprovalType::And),
            Just(ApprovalType::Or),
            Just(ApprovalType::Sequential),
        ]
    }

    fn arb_assignment() -> impl Strategy<Value = OperatorAssignment> {
        prop_oneof![
            prop::collection::vec(any::<u64>().prop_map(OperatorId), 0..5)
                .prop_map(OperatorAssignment::Static),
            "[a-z.]{0,12}".prop_map(OperatorAssignment::Expression),
        ]
    }

    fn arb_time() -> impl Strategy<Value = DateTime<Utc>> {
        (0i64..4_000_000_000, 0u32..1_000_000_000)
            .prop_map(|(secs, nanos)| DateTime::from_timestamp(secs, nanos).unwrap())
    }

    prop_compose! {
        fn arb_node(index: usize)(
            code in "\\PC{0,10}",
            name in "\\PC{0,16}",
            node_type in arb_node_type(),
            approval_type in arb_approval_type(),
            assignment in arb_assignment(),
            callback in proptest::option::of("[a-z-]{1,10}"),
        ) -> Node {
            Node {
                id: NodeId::new(format!("n{}", index)),
                code,
                name,
                node_type,
                approval_type,
                assignment,
                callback,
            }
        }
    }

    fn arb_graph() -> impl Strategy<Value = DefinitionGraph> {
        (1usize..8)
            .prop_flat_map(|n| {
                let nodes: Vec<_> = (0..n).map(arb_node).collect();
                let relations = prop::collection::vec(
                    (
                        0..n,
                        0..n,
                        any::<bool>(),
                        proptest::option::of("[a-z0-9 ><=.]{1,16}"),
                    ),
                    0..12,
                );
                (
                    nodes,
                    relations,
                    "\\PC{0,20}",
                    "\\PC{0,40}",
                    any::<u32>(),
                    any::<u64>(),
                    arb_time(),
                    arb_time(),
                    any::<bool>(),
                    any::<u32>(),
                )
            })
            .prop_map(
                |(nodes, rels, title, description, version, creator, created, updated, enabled, max)| {
                    let relations = rels
                        .into_iter()
                        .enumerate()
                        .map(|(i, (s, t, reject, guard))| Relation {
                            id: RelationId::new(format!("r{}", i)),
                            source: nodes[s].id.clone(),
                            target: nodes[t].id.clone(),
                            guard,
                            kind: if reject {
                                RelationKind::Reject
                            } else {
                                RelationKind::Pass
                            },
                        })
                        .collect();
                    DefinitionGraph {
                        id: GraphId::new(format!("g-{}", version)),
                        version,
                        title,
                        description,
                        creator: OperatorId(creator),
                        created_at: created,
                        updated_at: updated,
                        enabled,
                        postponed_max: max,
                        nodes,
                        relations,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn prop_round_trip(graph in arb_graph()) {
            let bytes = encode(&graph).unwrap();
            prop_assert_eq!(decode(&bytes).unwrap(), graph);
        }

        #[test]
        fn prop_single_bit_flip_never_yields_a_different_graph(
            graph in arb_graph(),
            pos in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut bytes = encode(&graph).unwrap().to_vec();
            let i = pos.index(bytes.len());
            bytes[i] ^= 1 << bit;
            prop_assert!(decode(&bytes).is_err());
        }
    }
}
