//! Chunk lookup and assembly for chunked datasets.

use crate::btree_v1;
use crate::bytes::{checked_product, slice_at, to_usize};
use crate::data_layout::ChunkIndex;
use crate::error::FormatError;
use crate::filter_pipeline::FilterPipeline;
use crate::filters::decode_chunk;

/// One stored chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Stored (possibly filtered) size in bytes.
    pub size: u64,
    /// Bit i set means filter i was skipped.
    pub filter_mask: u32,
    /// Element coordinates of the chunk origin, one per dataset dimension.
    pub offsets: Vec<u64>,
    pub address: u64,
}

/// Shape information shared by every chunk of one dataset.
#[derive(Debug, Clone, Copy)]
pub struct ChunkGrid<'a> {
    pub dims: &'a [u64],
    pub chunk_dims: &'a [u64],
    pub element_size: usize,
}

impl ChunkGrid<'_> {
    fn chunk_bytes(&self) -> Result<u64, FormatError> {
        self.chunk_dims
            .iter()
            .try_fold(self.element_size as u64, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| FormatError::corrupted("chunk size overflows"))
    }
}

/// Every chunk the index knows about. An unallocated index yields none.
pub fn collect_chunks(
    file: &[u8],
    index: &ChunkIndex,
    grid: &ChunkGrid<'_>,
) -> Result<Vec<ChunkInfo>, FormatError> {
    let rank = grid.chunk_dims.len();
    match *index {
        ChunkIndex::BTreeV1 { address: None }
        | ChunkIndex::Single { address: None, .. }
        | ChunkIndex::Implicit { address: None } => Ok(Vec::new()),
        ChunkIndex::BTreeV1 {
            address: Some(address),
        } => btree_v1::collect_chunks(file, address, rank + 1),
        ChunkIndex::Single {
            address: Some(address),
            filtered_size,
            filter_mask,
        } => Ok(vec![ChunkInfo {
            size: match filtered_size {
                Some(size) => size,
                None => grid.chunk_bytes()?,
            },
            filter_mask,
            offsets: vec![0; rank],
            address,
        }]),
        ChunkIndex::Implicit {
            address: Some(address),
        } => implicit_chunks(address, grid),
    }
}

/// Chunks of an implicit index: unfiltered, back to back, row-major by
/// chunk position.
pub fn implicit_chunks(address: u64, grid: &ChunkGrid<'_>) -> Result<Vec<ChunkInfo>, FormatError> {
    let chunk_bytes = grid.chunk_bytes()?;
    let per_dim: Vec<u64> = grid
        .dims
        .iter()
        .zip(grid.chunk_dims)
        .map(|(&d, &c)| d.div_ceil(c))
        .collect();
    let total = checked_product(per_dim.iter().copied(), "implicit chunk index")?;

    let mut chunks = Vec::with_capacity(to_usize(total)?);
    for linear in 0..total {
        let mut offsets = vec![0u64; per_dim.len()];
        let mut rest = linear;
        for d in (0..per_dim.len()).rev() {
            offsets[d] = (rest % per_dim[d]) * grid.chunk_dims[d];
            rest /= per_dim[d];
        }
        let chunk_address = linear
            .checked_mul(chunk_bytes)
            .and_then(|off| address.checked_add(off))
            .ok_or_else(|| FormatError::corrupted("implicit chunk address overflows"))?;
        chunks.push(ChunkInfo {
            size: chunk_bytes,
            filter_mask: 0,
            offsets,
            address: chunk_address,
        });
    }
    Ok(chunks)
}

/// Decode every chunk and overlay it on `out`, which must already hold
/// the fill pattern for the whole dataset.
pub fn read_chunked(
    file: &[u8],
    index: &ChunkIndex,
    grid: &ChunkGrid<'_>,
    pipeline: &FilterPipeline,
    out: &mut [u8],
) -> Result<(), FormatError> {
    if grid.dims.len() != grid.chunk_dims.len() {
        return Err(FormatError::corrupted(format!(
            "dataset rank {} but chunk rank {}",
            grid.dims.len(),
            grid.chunk_dims.len()
        )));
    }
    let chunk_bytes = to_usize(grid.chunk_bytes()?)?;
    let chunks = collect_chunks(file, index, grid)?;
    tracing::debug!(chunks = chunks.len(), chunk_bytes, "reading chunked dataset");

    for chunk in &chunks {
        if chunk.offsets.len() != grid.dims.len() {
            return Err(FormatError::corrupted(format!(
                "chunk at {:#x} has {} offsets for rank {}",
                chunk.address,
                chunk.offsets.len(),
                grid.dims.len()
            )));
        }
        if chunk.offsets.iter().zip(grid.dims).any(|(&o, &d)| o >= d) {
            tracing::debug!(address = chunk.address, "chunk lies outside the dataset extent");
            continue;
        }
        let raw = slice_at(file, chunk.address, chunk.size)?;
        let decoded = if pipeline.is_empty() {
            raw.to_vec()
        } else {
            decode_chunk(raw, pipeline, chunk.filter_mask, grid.element_size)?
        };
        if decoded.len() < chunk_bytes {
            return Err(FormatError::corrupted(format!(
                "chunk at {:#x} decodes to {} bytes, expected {chunk_bytes}",
                chunk.address,
                decoded.len()
            )));
        }
        tracing::trace!(address = chunk.address, offsets = ?chunk.offsets, "placing chunk");
        place_chunk(&decoded, &chunk.offsets, grid, out);
    }
    Ok(())
}

/// Copy one decoded chunk into the dataset buffer, dropping the parts that
/// extend past the dataset edge. Rows along the innermost dimension are
/// copied whole.
fn place_chunk(chunk: &[u8], origin: &[u64], grid: &ChunkGrid<'_>, out: &mut [u8]) {
    let rank = grid.dims.len();
    let esize = grid.element_size;
    if rank == 0 {
        let n = out.len().min(chunk.len());
        out[..n].copy_from_slice(&chunk[..n]);
        return;
    }
    let dims: Vec<usize> = grid.dims.iter().map(|&d| d as usize).collect();
    let cdims: Vec<usize> = grid.chunk_dims.iter().map(|&d| d as usize).collect();
    let origin: Vec<usize> = origin.iter().map(|&o| o as usize).collect();

    // extent of the chunk actually inside the dataset
    let valid: Vec<usize> = (0..rank)
        .map(|d| cdims[d].min(dims[d] - origin[d]))
        .collect();
    let row_len = valid[rank - 1] * esize;
    let outer: usize = valid[..rank - 1].iter().product();

    let mut idx = vec![0usize; rank - 1];
    for _ in 0..outer {
        let mut src = 0usize;
        let mut dst = 0usize;
        for d in 0..rank - 1 {
            src = src * cdims[d] + idx[d];
            dst = dst * dims[d] + origin[d] + idx[d];
        }
        let src = (src * cdims[rank - 1]) * esize;
        let dst = (dst * dims[rank - 1] + origin[rank - 1]) * esize;
        out[dst..dst + row_len].copy_from_slice(&chunk[src..src + row_len]);

        for d in (0..rank - 1).rev() {
            idx[d] += 1;
            if idx[d] < valid[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}
