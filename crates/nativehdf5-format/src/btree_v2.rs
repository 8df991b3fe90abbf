//! Version 2 B-trees ("BTHD", "BTIN", "BTLF") indexing dense links and
//! attributes.

use crate::bytes::{expect_signature, read_u16, read_u32, read_u64, read_u8, read_uint, slice, to_usize};
use crate::checksum::verify_checksum;
use crate::error::FormatError;

/// Signature, version, type and checksum around every node's contents.
const NODE_OVERHEAD: usize = 10;

/// Per-depth record limits, derived from the header the same way the
/// library sizes its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    /// Records a node at this depth may hold.
    pub max_nrec: u64,
    /// Records a subtree rooted at this depth may hold.
    pub cum_max_nrec: u64,
    /// Width of a child's total-records field when the parent sits one level up.
    pub cum_max_nrec_size: usize,
}

/// Parsed B-tree v2 header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeV2Header {
    pub address: u64,
    pub tree_type: u8,
    pub node_size: u32,
    pub record_size: u16,
    /// 0 when the root is a leaf.
    pub depth: u16,
    pub root_address: Option<u64>,
    pub root_nrec: u16,
    pub total_records: u64,
    /// Width of a child's record-count field in internal nodes.
    pub max_nrec_size: usize,
    /// Indexed by depth, 0 = leaves.
    pub node_info: Vec<NodeInfo>,
}

/// A decoded record, by tree type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BTreeV2Record {
    /// Type 5: link indexed by name hash.
    LinkName { hash: u32, heap_id: Vec<u8> },
    /// Type 6: link indexed by creation order.
    LinkCreationOrder { order: u64, heap_id: Vec<u8> },
    /// Type 8: attribute indexed by name hash.
    AttributeName {
        heap_id: Vec<u8>,
        flags: u8,
        creation_order: u32,
        hash: u32,
    },
    /// Type 9: attribute indexed by creation order.
    AttributeCreationOrder {
        heap_id: Vec<u8>,
        flags: u8,
        creation_order: u32,
    },
}

impl BTreeV2Record {
    /// Fractal heap id of the indexed object.
    pub fn heap_id(&self) -> &[u8] {
        match self {
            BTreeV2Record::LinkName { heap_id, .. }
            | BTreeV2Record::LinkCreationOrder { heap_id, .. }
            | BTreeV2Record::AttributeName { heap_id, .. }
            | BTreeV2Record::AttributeCreationOrder { heap_id, .. } => heap_id,
        }
    }

    /// Creation order, when the record carries one.
    pub fn creation_order(&self) -> Option<u64> {
        match self {
            BTreeV2Record::LinkName { .. } => None,
            BTreeV2Record::LinkCreationOrder { order, .. } => Some(*order),
            BTreeV2Record::AttributeName { creation_order, .. }
            | BTreeV2Record::AttributeCreationOrder { creation_order, .. } => {
                Some(*creation_order as u64)
            }
        }
    }

    fn parse(tree_type: u8, raw: &[u8]) -> Result<BTreeV2Record, FormatError> {
        let rest = |start: usize| -> Result<Vec<u8>, FormatError> {
            raw.get(start..)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| FormatError::corrupted("B-tree v2 record too short"))
        };
        let record = match tree_type {
            5 => BTreeV2Record::LinkName {
                hash: read_u32(raw, 0)?,
                heap_id: rest(4)?,
            },
            6 => BTreeV2Record::LinkCreationOrder {
                order: read_u64(raw, 0)?,
                heap_id: rest(8)?,
            },
            8 => BTreeV2Record::AttributeName {
                heap_id: slice(raw, 0, 8)?.to_vec(),
                flags: read_u8(raw, 8)?,
                creation_order: read_u32(raw, 9)?,
                hash: read_u32(raw, 13)?,
            },
            9 => BTreeV2Record::AttributeCreationOrder {
                heap_id: slice(raw, 0, 8)?.to_vec(),
                flags: read_u8(raw, 8)?,
                creation_order: read_u32(raw, 9)?,
            },
            t => return Err(FormatError::unsupported(format!("B-tree v2 record type {t}"))),
        };
        if let BTreeV2Record::AttributeName { flags, .. }
        | BTreeV2Record::AttributeCreationOrder { flags, .. } = &record
        {
            if flags & 0x01 != 0 {
                return Err(FormatError::unsupported("attribute stored in the shared message heap"));
            }
        }
        Ok(record)
    }
}

/// `floor(log2(n)) / 8 + 1`, the byte width used for record counts.
fn count_width(n: u64) -> usize {
    let log2 = if n == 0 { 0 } else { 63 - n.leading_zeros() as usize };
    log2 / 8 + 1
}

/// Compute the per-depth limits for a tree of the given shape.
pub fn compute_node_info(
    node_size: u32,
    record_size: u16,
    depth: u16,
) -> Result<(usize, Vec<NodeInfo>), FormatError> {
    let node_size = node_size as u64;
    let rec = record_size as u64;
    if rec == 0 || node_size <= NODE_OVERHEAD as u64 {
        return Err(FormatError::corrupted(format!(
            "B-tree v2 node size {node_size} with record size {rec}"
        )));
    }

    let leaf_max = (node_size - NODE_OVERHEAD as u64) / rec;
    let max_nrec_size = count_width(leaf_max);
    let mut info = vec![NodeInfo {
        max_nrec: leaf_max,
        cum_max_nrec: leaf_max,
        cum_max_nrec_size: 0,
    }];

    for d in 1..=depth as usize {
        let prev = info[d - 1];
        let ptr = 8 + max_nrec_size as u64 + if d > 1 { prev.cum_max_nrec_size as u64 } else { 0 };
        let max_nrec = node_size
            .checked_sub(NODE_OVERHEAD as u64 + ptr)
            .map(|room| room / (rec + ptr))
            .unwrap_or(0);
        let cum_max_nrec = (max_nrec + 1)
            .saturating_mul(prev.cum_max_nrec)
            .saturating_add(max_nrec);
        info.push(NodeInfo {
            max_nrec,
            cum_max_nrec,
            cum_max_nrec_size: count_width(cum_max_nrec),
        });
    }
    Ok((max_nrec_size, info))
}

impl BTreeV2Header {
    pub fn parse(file: &[u8], address: u64) -> Result<BTreeV2Header, FormatError> {
        let base = to_usize(address)?;
        expect_signature(file, base, b"BTHD")?;
        let version = read_u8(file, base + 4)?;
        if version != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "B-tree v2 header",
                version,
            });
        }
        // sig(4) + version(1) + type(1) + node size(4) + record size(2)
        // + depth(2) + split(1) + merge(1) + root(8) + root nrec(2) + total(8)
        verify_checksum(file, base, 34)?;

        let tree_type = read_u8(file, base + 5)?;
        let node_size = read_u32(file, base + 6)?;
        let record_size = read_u16(file, base + 10)?;
        let depth = read_u16(file, base + 12)?;
        let root = read_u64(file, base + 16)?;
        let root_nrec = read_u16(file, base + 24)?;
        let total_records = read_u64(file, base + 26)?;

        let (max_nrec_size, node_info) = compute_node_info(node_size, record_size, depth)?;

        Ok(BTreeV2Header {
            address,
            tree_type,
            node_size,
            record_size,
            depth,
            root_address: (root != u64::MAX).then_some(root),
            root_nrec,
            total_records,
            max_nrec_size,
            node_info,
        })
    }

    /// Every record in key order.
    pub fn collect_records(&self, file: &[u8]) -> Result<Vec<BTreeV2Record>, FormatError> {
        let mut out = Vec::new();
        let Some(root) = self.root_address else {
            return Ok(out);
        };
        if self.root_nrec == 0 {
            return Ok(out);
        }
        self.collect_node(file, root, self.root_nrec as u64, self.depth as usize, &mut out)?;
        tracing::trace!(
            address = self.address,
            tree_type = self.tree_type,
            records = out.len(),
            "walked B-tree v2"
        );
        Ok(out)
    }

    fn collect_node(
        &self,
        file: &[u8],
        address: u64,
        nrec: u64,
        depth: usize,
        out: &mut Vec<BTreeV2Record>,
    ) -> Result<(), FormatError> {
        let info = self.node_info[depth];
        if nrec > info.max_nrec {
            return Err(FormatError::corrupted(format!(
                "B-tree v2 node at {address:#x} declares {nrec} records, at most {} fit",
                info.max_nrec
            )));
        }
        let base = to_usize(address)?;
        let signature: &'static [u8; 4] = if depth == 0 { b"BTLF" } else { b"BTIN" };
        expect_signature(file, base, signature)?;
        let version = read_u8(file, base + 4)?;
        if version != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "B-tree v2 node",
                version,
            });
        }
        let node_type = read_u8(file, base + 5)?;
        if node_type != self.tree_type {
            return Err(FormatError::corrupted(format!(
                "B-tree v2 node type {node_type} in a type {} tree",
                self.tree_type
            )));
        }

        let nrec = nrec as usize;
        let rs = self.record_size as usize;
        let records_start = base + 6;
        let records = slice(file, records_start, nrec * rs)?;

        if depth == 0 {
            verify_checksum(file, base, 6 + nrec * rs)?;
            for raw in records.chunks_exact(rs) {
                out.push(BTreeV2Record::parse(self.tree_type, raw)?);
            }
            return Ok(());
        }

        let child_info = self.node_info[depth - 1];
        let total_width = if depth > 1 { child_info.cum_max_nrec_size } else { 0 };
        let mut pos = records_start + nrec * rs;
        let mut children = Vec::with_capacity(nrec + 1);
        for _ in 0..=nrec {
            let child = read_u64(file, pos)?;
            pos += 8;
            let child_nrec = read_uint(file, pos, self.max_nrec_size)?;
            pos += self.max_nrec_size;
            pos += total_width;
            children.push((child, child_nrec));
        }
        verify_checksum(file, base, pos - base)?;

        for (i, (child, child_nrec)) in children.into_iter().enumerate() {
            self.collect_node(file, child, child_nrec, depth - 1, out)?;
            if i < nrec {
                out.push(BTreeV2Record::parse(self.tree_type, &records[i * rs..(i + 1) * rs])?);
            }
        }
        Ok(())
    }
}
