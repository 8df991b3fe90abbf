//! Fractal heaps ("FRHP", "FHIB", "FHDB") holding dense links and
//! attributes.
//!
//! Only managed objects are read. A heap id names an offset into the heap's
//! linear address space, which the doubling table maps onto direct blocks:
//! rows 0 and 1 use the starting block size, every later row doubles it, and
//! each row holds `table_width` blocks.

use crate::bytes::{
    expect_signature, read_address, read_u16, read_u32, read_u64, read_u8, read_uint, slice,
    slice_at, to_usize,
};
use crate::checksum::{jenkins_lookup3, verify_checksum};
use crate::error::FormatError;

/// Header flag: direct blocks carry a checksum.
const FLAG_DIRECT_BLOCK_CHECKSUM: u8 = 0x02;

/// Header bytes covered by its checksum.
const HEADER_SIZE: usize = 142;

/// Parsed fractal heap header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FractalHeap {
    pub address: u64,
    pub heap_id_length: u16,
    pub flags: u8,
    pub max_managed_object_size: u32,
    pub managed_object_count: u64,
    pub table_width: u16,
    pub starting_block_size: u64,
    pub max_direct_block_size: u64,
    /// Bits in a heap offset (32 or 40).
    pub max_heap_size: u16,
    pub root_block_address: Option<u64>,
    /// 0 when the root is a direct block.
    pub root_rows: u16,
}

/// The direct block holding a heap offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLocation {
    pub address: u64,
    /// Heap offset of the block's first byte.
    pub heap_offset: u64,
    pub size: u64,
}

fn log2(n: u64) -> u32 {
    63 - n.max(1).leading_zeros()
}

impl FractalHeap {
    pub fn parse(file: &[u8], address: u64) -> Result<FractalHeap, FormatError> {
        let base = to_usize(address)?;
        expect_signature(file, base, b"FRHP")?;
        let version = read_u8(file, base + 4)?;
        if version != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "fractal heap",
                version,
            });
        }
        if read_u16(file, base + 7)? != 0 {
            return Err(FormatError::unsupported("fractal heap I/O filters"));
        }
        verify_checksum(file, base, HEADER_SIZE)?;

        let heap = FractalHeap {
            address,
            heap_id_length: read_u16(file, base + 5)?,
            flags: read_u8(file, base + 9)?,
            max_managed_object_size: read_u32(file, base + 10)?,
            managed_object_count: read_u64(file, base + 70)?,
            table_width: read_u16(file, base + 110)?,
            starting_block_size: read_u64(file, base + 112)?,
            max_direct_block_size: read_u64(file, base + 120)?,
            max_heap_size: read_u16(file, base + 128)?,
            root_block_address: read_address(file, base + 132)?,
            root_rows: read_u16(file, base + 140)?,
        };

        if heap.table_width != 4 {
            return Err(FormatError::unsupported(format!(
                "fractal heap table width {}",
                heap.table_width
            )));
        }
        if !matches!(heap.max_heap_size, 32 | 40) {
            return Err(FormatError::unsupported(format!(
                "fractal heap size of {} bits",
                heap.max_heap_size
            )));
        }
        if !heap.starting_block_size.is_power_of_two()
            || !heap.max_direct_block_size.is_power_of_two()
            || heap.max_direct_block_size < heap.starting_block_size
        {
            return Err(FormatError::corrupted(format!(
                "fractal heap block sizes {} / {}",
                heap.starting_block_size, heap.max_direct_block_size
            )));
        }
        tracing::trace!(address, objects = heap.managed_object_count, "parsed fractal heap");
        Ok(heap)
    }

    /// Bytes of a heap offset field.
    fn offset_width(&self) -> usize {
        (self.max_heap_size as usize).div_ceil(8)
    }

    /// Size of each block in doubling-table row `row`.
    pub fn row_block_size(&self, row: usize) -> Option<u64> {
        if row <= 1 {
            return Some(self.starting_block_size);
        }
        let shift = u32::try_from(row - 1).ok()?;
        self.starting_block_size.checked_mul(1u64.checked_shl(shift)?)
    }

    /// Rows of an indirect block that hold direct blocks.
    fn max_direct_rows(&self) -> usize {
        (log2(self.max_direct_block_size) - log2(self.starting_block_size)) as usize + 2
    }

    /// Rows in a child indirect block covering `size` heap bytes.
    fn rows_for_size(&self, size: u64) -> Result<usize, FormatError> {
        let first_row_bits = log2(self.starting_block_size) + log2(self.table_width as u64);
        let bits = log2(size);
        if bits < first_row_bits {
            return Err(FormatError::corrupted(format!(
                "indirect block of {size} bytes below the first row"
            )));
        }
        Ok((bits - first_row_bits) as usize + 1)
    }

    /// Split a managed heap id into (offset, length).
    pub fn decode_id(&self, id: &[u8]) -> Result<(u64, u64), FormatError> {
        let first = read_u8(id, 0)?;
        if first >> 6 != 0 {
            return Err(FormatError::corrupted(format!(
                "heap id version {}",
                first >> 6
            )));
        }
        match (first >> 4) & 0x03 {
            0 => {}
            1 => return Err(FormatError::unsupported("huge fractal heap objects")),
            2 => return Err(FormatError::unsupported("tiny fractal heap objects")),
            t => return Err(FormatError::corrupted(format!("heap id type {t}"))),
        }
        let width = self.offset_width();
        let offset = read_uint(id, 1, width)?;
        let len_width = id.len().saturating_sub(1 + width).min(8);
        let length = read_uint(id, 1 + width, len_width)?;
        Ok((offset, length))
    }

    /// Find the direct block containing heap offset `offset`.
    pub fn locate(&self, file: &[u8], offset: u64) -> Result<BlockLocation, FormatError> {
        let root = self
            .root_block_address
            .ok_or_else(|| FormatError::corrupted("fractal heap has no root block"))?;
        if self.root_rows == 0 {
            if offset >= self.starting_block_size {
                return Err(FormatError::corrupted(format!(
                    "heap offset {offset} beyond the root direct block"
                )));
            }
            return Ok(BlockLocation {
                address: root,
                heap_offset: 0,
                size: self.starting_block_size,
            });
        }
        self.locate_in_indirect(file, root, self.root_rows as usize, 0, offset)
    }

    fn locate_in_indirect(
        &self,
        file: &[u8],
        address: u64,
        nrows: usize,
        block_offset: u64,
        target: u64,
    ) -> Result<BlockLocation, FormatError> {
        let base = to_usize(address)?;
        expect_signature(file, base, b"FHIB")?;
        let version = read_u8(file, base + 4)?;
        if version != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "fractal heap indirect block",
                version,
            });
        }
        let width = self.offset_width();
        let entries = nrows
            .checked_mul(self.table_width as usize)
            .and_then(|n| n.checked_mul(8))
            .ok_or_else(|| FormatError::corrupted("indirect block size overflows"))?;
        verify_checksum(file, base, 13 + width + entries)?;
        let stored_offset = read_uint(file, base + 13, width)?;
        if stored_offset != block_offset {
            return Err(FormatError::corrupted(format!(
                "indirect block at {address:#x} claims heap offset {stored_offset}, expected {block_offset}"
            )));
        }

        let direct_rows = self.max_direct_rows();
        let mut pos = base + 13 + width;
        let mut current = block_offset;
        for row in 0..nrows {
            let size = self
                .row_block_size(row)
                .ok_or_else(|| FormatError::corrupted("doubling table row overflows"))?;
            for _ in 0..self.table_width {
                let entry = read_address(file, pos)?;
                pos += 8;
                if target >= current && target - current < size {
                    let child = entry.ok_or_else(|| {
                        FormatError::corrupted(format!("heap offset {target} in an unallocated block"))
                    })?;
                    if row < direct_rows {
                        return Ok(BlockLocation {
                            address: child,
                            heap_offset: current,
                            size,
                        });
                    }
                    let child_rows = self.rows_for_size(size)?;
                    if child_rows >= nrows {
                        return Err(FormatError::corrupted("indirect block does not shrink"));
                    }
                    return self.locate_in_indirect(file, child, child_rows, current, target);
                }
                current = current.saturating_add(size);
            }
        }
        Err(FormatError::corrupted(format!(
            "heap offset {target} beyond the indirect block at {address:#x}"
        )))
    }

    /// Read the managed object named by `id`.
    pub fn read_object(&self, file: &[u8], id: &[u8]) -> Result<Vec<u8>, FormatError> {
        let (offset, length) = self.decode_id(id)?;
        let block = self.locate(file, offset)?;

        let base = to_usize(block.address)?;
        expect_signature(file, base, b"FHDB")?;
        let block_bytes = slice_at(file, block.address, block.size)?;
        if self.flags & FLAG_DIRECT_BLOCK_CHECKSUM != 0 {
            let at = 13 + self.offset_width();
            let stored = read_u32(block_bytes, at)?;
            let mut zeroed = block_bytes.to_vec();
            zeroed[at..at + 4].fill(0);
            let computed = jenkins_lookup3(&zeroed);
            if stored != computed {
                return Err(FormatError::ChecksumMismatch {
                    expected: stored,
                    computed,
                });
            }
        }

        let local = to_usize(offset - block.heap_offset)?;
        let data = slice(block_bytes, local, to_usize(length)?).map_err(|_| {
            FormatError::corrupted(format!(
                "heap object of {length} bytes at {offset} overruns its block"
            ))
        })?;
        Ok(data.to_vec())
    }
}
