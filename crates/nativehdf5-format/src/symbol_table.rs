//! Symbol table message (type 0x0011), symbol table entries and
//! symbol table nodes ("SNOD") used by legacy groups.

use crate::bytes::{
    expect_signature, read_address, read_u16, read_u32, read_u64, read_u8, slice, to_usize,
    OFFSET_SIZE,
};
use crate::error::FormatError;

/// Size of one symbol table entry with 8-byte offsets.
pub const SYMBOL_TABLE_ENTRY_SIZE: usize = OFFSET_SIZE * 2 + 4 + 4 + 16;

/// Symbol Table message found in legacy group object headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTableMessage {
    /// Address of the group's B-tree v1 (node type 0).
    pub btree_address: u64,
    /// Address of the group's local heap.
    pub local_heap_address: u64,
}

impl SymbolTableMessage {
    /// Parse a Symbol Table message from raw message bytes.
    pub fn parse(data: &[u8]) -> Result<SymbolTableMessage, FormatError> {
        Ok(SymbolTableMessage {
            btree_address: read_u64(data, 0)?,
            local_heap_address: read_u64(data, OFFSET_SIZE)?,
        })
    }
}

/// One entry of a symbol table node, or the root entry of a v0/v1 superblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTableEntry {
    /// Byte offset of the link name in the group's local heap.
    pub link_name_offset: u64,
    /// Address of the object's header.
    pub object_header_address: Option<u64>,
    /// Cache type: 0 none, 1 group, 2 symbolic link.
    pub cache_type: u32,
    /// Cached symbol table addresses when `cache_type` is 1.
    pub cached_symbol_table: Option<SymbolTableMessage>,
}

impl SymbolTableEntry {
    /// Parse one entry at `pos`.
    pub fn parse(data: &[u8], pos: usize) -> Result<SymbolTableEntry, FormatError> {
        let link_name_offset = read_u64(data, pos)?;
        let object_header_address = read_address(data, pos + 8)?;
        let cache_type = read_u32(data, pos + 16)?;
        let reserved = read_u32(data, pos + 20)?;
        if reserved != 0 {
            tracing::warn!(reserved, "symbol table entry reserved field not zero");
        }
        let cached_symbol_table = if cache_type == 1 {
            Some(SymbolTableMessage::parse(slice(data, pos + 24, 16)?)?)
        } else {
            None
        };
        Ok(SymbolTableEntry {
            link_name_offset,
            object_header_address,
            cache_type,
            cached_symbol_table,
        })
    }
}

/// A parsed symbol table node.
#[derive(Debug, Clone)]
pub struct SymbolTableNode {
    /// The entries in name order.
    pub entries: Vec<SymbolTableEntry>,
}

impl SymbolTableNode {
    /// Parse a symbol table node at the given address.
    pub fn parse(file_data: &[u8], address: u64) -> Result<SymbolTableNode, FormatError> {
        let offset = to_usize(address)?;
        expect_signature(file_data, offset, b"SNOD")?;
        let version = read_u8(file_data, offset + 4)?;
        if version != 1 {
            return Err(FormatError::UnsupportedVersion {
                structure: "symbol table node",
                version,
            });
        }
        let count = read_u16(file_data, offset + 6)? as usize;
        let mut entries = Vec::with_capacity(count);
        let mut pos = offset + 8;
        for _ in 0..count {
            entries.push(SymbolTableEntry::parse(file_data, pos)?);
            pos += SYMBOL_TABLE_ENTRY_SIZE;
        }
        Ok(SymbolTableNode { entries })
    }
}
