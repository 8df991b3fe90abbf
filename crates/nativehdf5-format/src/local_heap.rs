//! Local heap parsing ("HEAP"), the name store of legacy groups.

use crate::bytes::{expect_signature, read_cstr, read_u64, read_u8, slice_at, to_usize};
use crate::error::FormatError;

/// Parsed local heap header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHeap {
    pub data_segment_size: u64,
    pub free_list_head_offset: u64,
    pub data_segment_address: u64,
}

impl LocalHeap {
    pub fn parse(file: &[u8], address: u64) -> Result<LocalHeap, FormatError> {
        let base = to_usize(address)?;
        expect_signature(file, base, b"HEAP")?;
        let version = read_u8(file, base + 4)?;
        if version != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "local heap",
                version,
            });
        }
        Ok(LocalHeap {
            data_segment_size: read_u64(file, base + 8)?,
            free_list_head_offset: read_u64(file, base + 16)?,
            data_segment_address: read_u64(file, base + 24)?,
        })
    }

    /// The NUL-terminated string at `offset` within the data segment.
    pub fn read_string(&self, file: &[u8], offset: u64) -> Result<String, FormatError> {
        let segment = slice_at(file, self.data_segment_address, self.data_segment_size)?;
        if offset >= self.data_segment_size {
            return Err(FormatError::corrupted(format!(
                "local heap offset {offset} outside a {}-byte segment",
                self.data_segment_size
            )));
        }
        let (name, _) = read_cstr(segment, to_usize(offset)?)?;
        Ok(name)
    }
}
