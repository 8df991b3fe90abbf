//! Data layout message parsing (message type 0x0008).

use crate::bytes::{read_address, read_u16, read_u32, read_u64, read_u8, read_uint};
use crate::error::FormatError;

/// How the chunks of a chunked dataset are found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkIndex {
    /// Version 3 layouts: a version 1 B-tree of raw-data chunks.
    BTreeV1 { address: Option<u64> },
    /// One chunk covering the whole dataset.
    Single {
        address: Option<u64>,
        /// Stored size when the chunk is filtered.
        filtered_size: Option<u64>,
        filter_mask: u32,
    },
    /// Unfiltered chunks stored back to back in row-major chunk order.
    Implicit { address: Option<u64> },
}

/// A parsed data layout message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLayout {
    /// One region; `None` when never allocated.
    Contiguous { address: Option<u64>, size: u64 },
    Chunked {
        /// Chunk extent per dataset dimension, element dimension removed.
        chunk_dims: Vec<u64>,
        /// The trailing element-size dimension of the message.
        element_size: u64,
        index: ChunkIndex,
    },
}

impl DataLayout {
    pub fn parse(data: &[u8]) -> Result<DataLayout, FormatError> {
        let version = read_u8(data, 0)?;
        if version != 3 && version != 4 {
            return Err(FormatError::UnsupportedVersion {
                structure: "data layout",
                version,
            });
        }
        let class = read_u8(data, 1)?;
        match class {
            0 => {
                let size = read_u16(data, 2)?;
                Err(FormatError::unsupported(format!(
                    "compact storage layout ({size} bytes)"
                )))
            }
            1 => Ok(DataLayout::Contiguous {
                address: read_address(data, 2)?,
                size: read_u64(data, 10)?,
            }),
            2 if version == 3 => parse_chunked_v3(data),
            2 => parse_chunked_v4(data),
            3 => Err(FormatError::unsupported("virtual storage layout")),
            c => Err(FormatError::corrupted(format!("data layout class {c}"))),
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, DataLayout::Chunked { .. })
    }
}

fn split_dims(mut dims: Vec<u64>) -> Result<(Vec<u64>, u64), FormatError> {
    if dims.len() < 2 {
        return Err(FormatError::corrupted(format!(
            "chunked layout dimensionality {}",
            dims.len()
        )));
    }
    if dims.iter().any(|&d| d == 0) {
        return Err(FormatError::corrupted("zero chunk dimension"));
    }
    let element_size = dims.pop().unwrap_or(0);
    Ok((dims, element_size))
}

fn parse_chunked_v3(data: &[u8]) -> Result<DataLayout, FormatError> {
    let ndims = read_u8(data, 2)? as usize;
    let address = read_address(data, 3)?;
    let mut dims = Vec::with_capacity(ndims);
    for i in 0..ndims {
        dims.push(read_u32(data, 11 + 4 * i)? as u64);
    }
    let (chunk_dims, element_size) = split_dims(dims)?;
    Ok(DataLayout::Chunked {
        chunk_dims,
        element_size,
        index: ChunkIndex::BTreeV1 { address },
    })
}

fn parse_chunked_v4(data: &[u8]) -> Result<DataLayout, FormatError> {
    let flags = read_u8(data, 2)?;
    let ndims = read_u8(data, 3)? as usize;
    let width = read_u8(data, 4)? as usize;
    if !(1..=8).contains(&width) {
        return Err(FormatError::corrupted(format!(
            "chunk dimension width {width}"
        )));
    }
    let mut pos = 5;
    let mut dims = Vec::with_capacity(ndims);
    for _ in 0..ndims {
        dims.push(read_uint(data, pos, width)?);
        pos += width;
    }
    let (chunk_dims, element_size) = split_dims(dims)?;

    let index_type = read_u8(data, pos)?;
    pos += 1;
    let index = match index_type {
        1 => {
            let (filtered_size, filter_mask) = if flags & 0x02 != 0 {
                let size = read_u64(data, pos)?;
                let mask = read_u32(data, pos + 8)?;
                pos += 12;
                (Some(size), mask)
            } else {
                (None, 0)
            };
            ChunkIndex::Single {
                address: read_address(data, pos)?,
                filtered_size,
                filter_mask,
            }
        }
        2 => ChunkIndex::Implicit {
            address: read_address(data, pos)?,
        },
        3 => return Err(FormatError::unsupported("fixed array chunk index")),
        4 => return Err(FormatError::unsupported("extensible array chunk index")),
        5 => return Err(FormatError::unsupported("version 2 B-tree chunk index")),
        t => {
            return Err(FormatError::corrupted(format!(
                "chunk index type {t}"
            )))
        }
    };
    Ok(DataLayout::Chunked {
        chunk_dims,
        element_size,
        index,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;

    pub(crate) fn contiguous(address: u64, size: u64) -> Vec<u8> {
        let mut buf = vec![3, 1];
        buf.extend_from_slice(&address.to_le_bytes());
        buf.extend_from_slice(&size.to_le_bytes());
        buf
    }

    /// Version 3 chunked layout; `dims` includes the element size.
    pub(crate) fn chunked_v3(btree: u64, dims: &[u32]) -> Vec<u8> {
        let mut buf = vec![3, 2, dims.len() as u8];
        buf.extend_from_slice(&btree.to_le_bytes());
        for d in dims {
            buf.extend_from_slice(&d.to_le_bytes());
        }
        buf
    }

    /// Version 4 single-chunk layout with 4-byte dimensions.
    pub(crate) fn single_chunk_v4(address: u64, dims: &[u32], filtered: Option<(u64, u32)>) -> Vec<u8> {
        let flags = if filtered.is_some() { 0x02 } else { 0 };
        let mut buf = vec![4, 2, flags, dims.len() as u8, 4];
        for d in dims {
            buf.extend_from_slice(&d.to_le_bytes());
        }
        buf.push(1);
        if let Some((size, mask)) = filtered {
            buf.extend_from_slice(&size.to_le_bytes());
            buf.extend_from_slice(&mask.to_le_bytes());
        }
        buf.extend_from_slice(&address.to_le_bytes());
        buf
    }

    #[test]
    fn contiguous_message() {
        let layout = DataLayout::parse(&contiguous(0x800, 96)).unwrap();
        assert_eq!(
            layout,
            DataLayout::Contiguous {
                address: Some(0x800),
                size: 96
            }
        );
        let layout = DataLayout::parse(&contiguous(u64::MAX, 96)).unwrap();
        assert_eq!(
            layout,
            DataLayout::Contiguous {
                address: None,
                size: 96
            }
        );
    }

    #[test]
    fn chunked_v3_strips_element_size() {
        let layout = DataLayout::parse(&chunked_v3(0x300, &[2, 3, 4])).unwrap();
        assert_eq!(
            layout,
            DataLayout::Chunked {
                chunk_dims: vec![2, 3],
                element_size: 4,
                index: ChunkIndex::BTreeV1 {
                    address: Some(0x300)
                },
            }
        );
    }

    #[test]
    fn single_chunk_filtered() {
        let data = single_chunk_v4(0x900, &[10, 8], Some((37, 0)));
        let DataLayout::Chunked { chunk_dims, index, .. } = DataLayout::parse(&data).unwrap() else {
            panic!("expected chunked layout");
        };
        assert_eq!(chunk_dims, vec![10]);
        assert_eq!(
            index,
            ChunkIndex::Single {
                address: Some(0x900),
                filtered_size: Some(37),
                filter_mask: 0
            }
        );
    }

    #[test]
    fn implicit_index_with_narrow_dims() {
        let mut data = vec![4, 2, 0, 3, 1, 5, 6, 4, 2];
        data.extend_from_slice(&0x1000u64.to_le_bytes());
        let layout = DataLayout::parse(&data).unwrap();
        assert_eq!(
            layout,
            DataLayout::Chunked {
                chunk_dims: vec![5, 6],
                element_size: 4,
                index: ChunkIndex::Implicit {
                    address: Some(0x1000)
                },
            }
        );
    }

    #[test]
    fn rejected_layouts() {
        let compact = [3u8, 0, 4, 0, 1, 2, 3, 4];
        assert_eq!(
            DataLayout::parse(&compact).unwrap_err().kind(),
            ErrorKind::UnsupportedFeature
        );
        let virtual_layout = [4u8, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            DataLayout::parse(&virtual_layout).unwrap_err().kind(),
            ErrorKind::UnsupportedFeature
        );
        assert_eq!(
            DataLayout::parse(&[2, 1]).unwrap_err().kind(),
            ErrorKind::UnsupportedVersion
        );
        let mut fixed_array = vec![4, 2, 0, 2, 4];
        fixed_array.extend_from_slice(&4u32.to_le_bytes());
        fixed_array.extend_from_slice(&8u32.to_le_bytes());
        fixed_array.extend_from_slice(&[3, 10]);
        fixed_array.extend_from_slice(&0u64.to_le_bytes());
        assert_eq!(
            DataLayout::parse(&fixed_array).unwrap_err().kind(),
            ErrorKind::UnsupportedFeature
        );
    }

    #[test]
    fn missing_element_dimension() {
        let err = DataLayout::parse(&chunked_v3(0x300, &[4])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }
}
