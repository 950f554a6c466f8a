use crate::{tag, FORMAT_VERSION, GRAPH_MAGIC, HEADER_SIZE, TRAILER_SIZE};
use bytes::Buf;
use chrono::{DateTime, Utc};
use flow_types::{
    DefinitionGraph, FormatError, GraphId, Node, NodeId, OperatorAssignment, OperatorId, Relation,
    RelationId,
};
use tracing::debug;

/// Decode a definition graph from its binary form.
///
/// Either the whole graph is returned or an error; never a partial graph.
pub fn decode(input: &[u8]) -> Result<DefinitionGraph, FormatError> {
    let mut r = Reader::new(input);

    if r.take(4)? != GRAPH_MAGIC {
        return Err(FormatError::BadMagic);
    }
    let version = r.u16()?;
    if version != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }
    let _flags = r.u16()?;

    if input.len() < HEADER_SIZE + TRAILER_SIZE {
        return Err(FormatError::Truncated {
            offset: input.len(),
            needed: HEADER_SIZE + TRAILER_SIZE - input.len(),
        });
    }
    let body_end = input.len() - TRAILER_SIZE;
    let stored = (&input[body_end..]).get_u32_le();
    let computed = crc32fast::hash(&input[..body_end]);
    if stored != computed {
        return Err(FormatError::ChecksumMismatch { stored, computed });
    }

    // From here on the reader must not run into the trailer
    let mut r = Reader {
        input: &input[..body_end],
        offset: r.offset,
    };

    let id = GraphId(r.string("graph id")?);
    let graph_version = r.u32()?;
    let title = r.string("title")?;
    let description = r.string("description")?;
    let creator = OperatorId(r.u64()?);
    let created_at = r.time("created time")?;
    let updated_at = r.time("updated time")?;
    let enabled = r.flag("enabled")?;
    let postponed_max = r.u32()?;

    let node_count = r.u32()?;
    let mut nodes = Vec::with_capacity(r.capacity_hint(node_count));
    for _ in 0..node_count {
        nodes.push(read_node(&mut r)?);
    }

    let relation_count = r.u32()?;
    let mut relations = Vec::with_capacity(r.capacity_hint(relation_count));
    for _ in 0..relation_count {
        relations.push(read_relation(&mut r, &nodes)?);
    }

    if r.remaining() > 0 {
        return Err(FormatError::TrailingBytes(r.remaining()));
    }

    debug!(
        graph_id = %id,
        version = graph_version,
        nodes = nodes.len(),
        relations = relations.len(),
        "Decoded definition graph"
    );

    Ok(DefinitionGraph {
        id,
        version: graph_version,
        title,
        description,
        creator,
        created_at,
        updated_at,
        enabled,
        postponed_max,
        nodes,
        relations,
    })
}

fn read_node(r: &mut Reader<'_>) -> Result<Node, FormatError> {
    let id = NodeId(r.string("node id")?);
    let code = r.string("node code")?;
    let name = r.string("node name")?;
    let node_type = tag::to_node_type(r.u8()?)?;
    let approval_type = tag::to_approval_type(r.u8()?)?;

    let assignment = match r.u8()? {
        tag::ASSIGN_STATIC => {
            let count = r.u32()?;
            let mut ids = Vec::with_capacity(r.capacity_hint(count));
            for _ in 0..count {
                ids.push(OperatorId(r.u64()?));
            }
            OperatorAssignment::Static(ids)
        }
        tag::ASSIGN_EXPRESSION => OperatorAssignment::Expression(r.string("assignment")?),
        other => {
            return Err(FormatError::InvalidTag {
                field: "assignment",
                tag: other,
            })
        }
    };

    let callback = r.opt_string("callback")?;

    Ok(Node {
        id,
        code,
        name,
        node_type,
        approval_type,
        assignment,
        callback,
    })
}

fn read_relation(r: &mut Reader<'_>, nodes: &[Node]) -> Result<Relation, FormatError> {
    let id = RelationId(r.string("relation id")?);
    let source = resolve(nodes, r.u32()?)?;
    let target = resolve(nodes, r.u32()?)?;
    let kind = tag::to_relation_kind(r.u8()?)?;
    let guard = r.opt_string("guard")?;

    Ok(Relation {
        id,
        source,
        target,
        guard,
        kind,
    })
}

fn resolve(nodes: &[Node], index: u32) -> Result<NodeId, FormatError> {
    nodes
        .get(index as usize)
        .map(|n| n.id.clone())
        .ok_or(FormatError::NodeIndexOutOfRange {
            index,
            count: nodes.len() as u32,
        })
}

// ── Reader ───────────────────────────────────────────────────────────

/// Bounds-checked cursor over the input
struct Reader<'a> {
    input: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.input.len().saturating_sub(self.offset)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if self.remaining() < n {
            return Err(FormatError::Truncated {
                offset: self.offset,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.input[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?.get_u8())
    }

    fn u16(&mut self) -> Result<u16, FormatError> {
        Ok(self.take(2)?.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32, FormatError> {
        Ok(self.take(4)?.get_u32_le())
    }

    fn u64(&mut self) -> Result<u64, FormatError> {
        Ok(self.take(8)?.get_u64_le())
    }

    fn i64(&mut self) -> Result<i64, FormatError> {
        Ok(self.take(8)?.get_i64_le())
    }

    fn flag(&mut self, field: &'static str) -> Result<bool, FormatError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(FormatError::InvalidTag { field, tag }),
        }
    }

    fn string(&mut self, field: &'static str) -> Result<String, FormatError> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| FormatError::InvalidUtf8(field))
    }

    fn opt_string(&mut self, field: &'static str) -> Result<Option<String>, FormatError> {
        if self.flag(field)? {
            Ok(Some(self.string(field)?))
        } else {
            Ok(None)
        }
    }

    fn time(&mut self, field: &'static str) -> Result<DateTime<Utc>, FormatError> {
        let secs = self.i64()?;
        let nanos = self.u32()?;
        DateTime::from_timestamp(secs, nanos).ok_or(FormatError::InvalidTimestamp(field))
    }

    /// Cap preallocation by what the remaining input could possibly hold
    fn capacity_hint(&self, count: u32) -> usize {
        (count as usize).min(self.remaining())
    }
}
