use crate::{tag, FORMAT_VERSION, GRAPH_MAGIC, HEADER_SIZE, TRAILER_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use flow_types::{DefinitionGraph, FlowError, FlowResult, Node, NodeId, OperatorAssignment, Relation};
use std::collections::HashMap;
use tracing::debug;

/// Encode a definition graph into its binary form.
///
/// Fails with a configuration error if a relation names a node that is not
/// in the node table, or a length does not fit the wire format.
pub fn encode(graph: &DefinitionGraph) -> FlowResult<Bytes> {
    let index: HashMap<&NodeId, u32> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| Ok((&n.id, wire_len(i, "node table")?)))
        .collect::<FlowResult<_>>()?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + 256 + graph.nodes.len() * 64);

    // Header
    buf.put_slice(&GRAPH_MAGIC);
    buf.put_u16_le(FORMAT_VERSION);
    buf.put_u16_le(0); // flags, reserved

    // Metadata
    put_str(&mut buf, &graph.id.0)?;
    buf.put_u32_le(graph.version);
    put_str(&mut buf, &graph.title)?;
    put_str(&mut buf, &graph.description)?;
    buf.put_u64_le(graph.creator.0);
    put_time(&mut buf, &graph.created_at);
    put_time(&mut buf, &graph.updated_at);
    buf.put_u8(graph.enabled as u8);
    buf.put_u32_le(graph.postponed_max);

    buf.put_u32_le(wire_len(graph.nodes.len(), "node table")?);
    for node in &graph.nodes {
        put_node(&mut buf, node)?;
    }

    buf.put_u32_le(wire_len(graph.relations.len(), "relation table")?);
    for relation in &graph.relations {
        put_relation(&mut buf, relation, &index)?;
    }

    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);

    debug!(
        graph_id = %graph.id,
        version = graph.version,
        nodes = graph.nodes.len(),
        relations = graph.relations.len(),
        bytes = buf.len(),
        "Encoded definition graph"
    );
    debug_assert!(buf.len() >= HEADER_SIZE + TRAILER_SIZE);

    Ok(buf.freeze())
}

fn put_node(buf: &mut BytesMut, node: &Node) -> FlowResult<()> {
    put_str(buf, &node.id.0)?;
    put_str(buf, &node.code)?;
    put_str(buf, &node.name)?;
    buf.put_u8(tag::node_type(node.node_type));
    buf.put_u8(tag::approval_type(node.approval_type));

    match &node.assignment {
        OperatorAssignment::Static(ids) => {
            buf.put_u8(tag::ASSIGN_STATIC);
            buf.put_u32_le(wire_len(ids.len(), "operator list")?);
            for id in ids {
                buf.put_u64_le(id.0);
            }
        }
        OperatorAssignment::Expression(expr) => {
            buf.put_u8(tag::ASSIGN_EXPRESSION);
            put_str(buf, expr)?;
        }
    }

    put_opt_str(buf, node.callback.as_deref())
}

fn put_relation(
    buf: &mut BytesMut,
    relation: &Relation,
    index: &HashMap<&NodeId, u32>,
) -> FlowResult<()> {
    let position = |id: &NodeId| {
        index.get(id).copied().ok_or_else(|| {
            FlowError::Configuration(format!(
                "relation '{}' references unknown node '{}'",
                relation.id, id
            ))
        })
    };

    put_str(buf, &relation.id.0)?;
    buf.put_u32_le(position(&relation.source)?);
    buf.put_u32_le(position(&relation.target)?);
    buf.put_u8(tag::relation_kind(relation.kind));
    put_opt_str(buf, relation.guard.as_deref())
}

fn put_str(buf: &mut BytesMut, s: &str) -> FlowResult<()> {
    buf.put_u32_le(wire_len(s.len(), "string")?);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_opt_str(buf: &mut BytesMut, s: Option<&str>) -> FlowResult<()> {
    match s {
        Some(s) => {
            buf.put_u8(1);
            put_str(buf, s)
        }
        None => {
            buf.put_u8(0);
            Ok(())
        }
    }
}

fn put_time(buf: &mut BytesMut, t: &DateTime<Utc>) {
    buf.put_i64_le(t.timestamp());
    buf.put_u32_le(t.timestamp_subsec_nanos());
}

fn wire_len(len: usize, what: &str) -> FlowResult<u32> {
    u32::try_from(len)
        .map_err(|_| FlowError::Configuration(format!("{} too large to encode ({})", what, len)))
}
