//! Version 1 B-trees ("TREE").
//!
//! Type 0 trees index the symbol-table nodes of legacy groups; type 1 trees
//! index the chunks of a chunked dataset.

use crate::bytes::{expect_signature, read_address, read_u16, read_u32, read_u64, read_u8, to_usize};
use crate::chunked_read::ChunkInfo;
use crate::error::FormatError;

/// Keys of a version 1 B-tree node, by node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BTreeV1Keys {
    /// Type 0: local heap offsets of the separating names.
    Group(Vec<u64>),
    /// Type 1: one key per chunk.
    Chunk(Vec<ChunkKey>),
}

/// Key of a raw-data chunk entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkKey {
    /// Stored (possibly filtered) size in bytes.
    pub size: u32,
    /// Bit i set means filter i was skipped for this chunk.
    pub filter_mask: u32,
    /// Element offsets of the chunk origin, plus a trailing element-size
    /// dimension whose offset is always zero.
    pub offsets: Vec<u64>,
}

/// A parsed version 1 B-tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeV1Node {
    pub node_type: u8,
    /// 0 for leaves.
    pub level: u8,
    pub left_sibling: Option<u64>,
    pub right_sibling: Option<u64>,
    /// `children.len() + 1` keys.
    pub keys: BTreeV1Keys,
    pub children: Vec<u64>,
}

impl BTreeV1Node {
    /// Parse the node at `address`. `ndims` is the chunk key dimensionality
    /// and is only consulted for type 1 nodes.
    pub fn parse(file: &[u8], address: u64, ndims: usize) -> Result<BTreeV1Node, FormatError> {
        let base = to_usize(address)?;
        expect_signature(file, base, b"TREE")?;
        let node_type = read_u8(file, base + 4)?;
        let level = read_u8(file, base + 5)?;
        let entries = read_u16(file, base + 6)? as usize;
        let left_sibling = read_address(file, base + 8)?;
        let right_sibling = read_address(file, base + 16)?;
        let mut pos = base + 24;

        let mut children = Vec::with_capacity(entries);
        let keys = match node_type {
            0 => {
                let mut keys = Vec::with_capacity(entries + 1);
                for i in 0..=entries {
                    keys.push(read_u64(file, pos)?);
                    pos += 8;
                    if i < entries {
                        children.push(read_u64(file, pos)?);
                        pos += 8;
                    }
                }
                BTreeV1Keys::Group(keys)
            }
            1 => {
                let mut keys = Vec::with_capacity(entries + 1);
                for i in 0..=entries {
                    let size = read_u32(file, pos)?;
                    let filter_mask = read_u32(file, pos + 4)?;
                    pos += 8;
                    let mut offsets = Vec::with_capacity(ndims);
                    for _ in 0..ndims {
                        offsets.push(read_u64(file, pos)?);
                        pos += 8;
                    }
                    keys.push(ChunkKey {
                        size,
                        filter_mask,
                        offsets,
                    });
                    if i < entries {
                        children.push(read_u64(file, pos)?);
                        pos += 8;
                    }
                }
                BTreeV1Keys::Chunk(keys)
            }
            t => return Err(FormatError::corrupted(format!("B-tree v1 node type {t}"))),
        };

        Ok(BTreeV1Node {
            node_type,
            level,
            left_sibling,
            right_sibling,
            keys,
            children,
        })
    }
}

fn check_child_level(parent: &BTreeV1Node, child: &BTreeV1Node, address: u64) -> Result<(), FormatError> {
    if child.node_type != parent.node_type || child.level + 1 != parent.level {
        return Err(FormatError::corrupted(format!(
            "B-tree v1 child at {address:#x} has type {} level {} under type {} level {}",
            child.node_type, child.level, parent.node_type, parent.level
        )));
    }
    Ok(())
}

/// Addresses of every symbol-table node ("SNOD") of a legacy group.
pub fn collect_symbol_table_nodes(file: &[u8], address: u64) -> Result<Vec<u64>, FormatError> {
    let root = BTreeV1Node::parse(file, address, 0)?;
    if root.node_type != 0 {
        return Err(FormatError::corrupted(format!(
            "expected a group B-tree at {address:#x}, found type {}",
            root.node_type
        )));
    }
    let mut out = Vec::new();
    collect_group(file, &root, &mut out)?;
    Ok(out)
}

fn collect_group(file: &[u8], node: &BTreeV1Node, out: &mut Vec<u64>) -> Result<(), FormatError> {
    if node.level == 0 {
        out.extend_from_slice(&node.children);
        return Ok(());
    }
    for &child_addr in &node.children {
        let child = BTreeV1Node::parse(file, child_addr, 0)?;
        check_child_level(node, &child, child_addr)?;
        collect_group(file, &child, out)?;
    }
    Ok(())
}

/// Every chunk indexed by the type 1 tree at `address`. `ndims` is the
/// dataset rank plus one.
pub fn collect_chunks(file: &[u8], address: u64, ndims: usize) -> Result<Vec<ChunkInfo>, FormatError> {
    let root = BTreeV1Node::parse(file, address, ndims)?;
    if root.node_type != 1 {
        return Err(FormatError::corrupted(format!(
            "expected a chunk B-tree at {address:#x}, found type {}",
            root.node_type
        )));
    }
    let mut out = Vec::new();
    collect_chunk_node(file, &root, ndims, &mut out)?;
    tracing::trace!(address, chunks = out.len(), "collected chunk index");
    Ok(out)
}

fn collect_chunk_node(
    file: &[u8],
    node: &BTreeV1Node,
    ndims: usize,
    out: &mut Vec<ChunkInfo>,
) -> Result<(), FormatError> {
    let BTreeV1Keys::Chunk(keys) = &node.keys else {
        return Err(FormatError::corrupted("group keys in a chunk B-tree"));
    };
    if node.level > 0 {
        for &child_addr in &node.children {
            let child = BTreeV1Node::parse(file, child_addr, ndims)?;
            check_child_level(node, &child, child_addr)?;
            collect_chunk_node(file, &child, ndims, out)?;
        }
        return Ok(());
    }
    for (key, &address) in keys.iter().zip(&node.children) {
        match key.offsets.last() {
            Some(0) => {}
            Some(off) => {
                return Err(FormatError::corrupted(format!(
                    "chunk key element offset is {off}, expected 0"
                )))
            }
            None => return Err(FormatError::corrupted("chunk key without offsets")),
        }
        out.push(ChunkInfo {
            size: key.size as u64,
            filter_mask: key.filter_mask,
            offsets: key.offsets[..key.offsets.len() - 1].to_vec(),
            address,
        });
    }
    Ok(())
}
