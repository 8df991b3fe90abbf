//! Dataset materialization: raw bytes from the layout, then values.

use crate::bytes::{slice_at, to_usize};
use crate::chunked_read::{read_chunked, ChunkGrid};
use crate::data_layout::DataLayout;
use crate::dataspace::{Dataspace, DataspaceType};
use crate::datatype::{ByteOrder, Datatype};
use crate::error::FormatError;
use crate::fill_value::FillValue;
use crate::filter_pipeline::FilterPipeline;
use crate::value::Value;
use crate::value_decode::ValueDecoder;

/// Everything needed to read one dataset's values.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    pub dataspace: Dataspace,
    pub datatype: Datatype,
    pub layout: DataLayout,
    pub filters: FilterPipeline,
    pub fill_value: FillValue,
}

impl DatasetInfo {
    /// Size of the fully materialized dataset in bytes.
    pub fn byte_len(&self) -> Result<u64, FormatError> {
        self.dataspace
            .num_elements()?
            .checked_mul(self.datatype.size() as u64)
            .ok_or_else(|| FormatError::corrupted("dataset size overflows"))
    }
}

fn ordered(bytes: [u8; 8], size: usize, order: ByteOrder) -> Vec<u8> {
    // `bytes` holds a little-endian value
    let mut v = bytes[..size].to_vec();
    if order == ByteOrder::BigEndian {
        v.reverse();
    }
    v
}

/// Bytes stored in never-written elements.
///
/// With an undefined fill value the pattern is a sentinel: the most
/// negative value for signed integers, all ones for unsigned integers,
/// NaN for floats and zero for string-like types.
pub fn fill_pattern(datatype: &Datatype, fill: &FillValue) -> Vec<u8> {
    let size = datatype.size() as usize;
    match fill {
        FillValue::Bytes(bytes) => {
            if size > 0 && bytes.len() != size {
                tracing::warn!(
                    fill_len = bytes.len(),
                    element_size = size,
                    "fill value size differs from element size"
                );
            }
            bytes.clone()
        }
        FillValue::Default => vec![0],
        FillValue::Undefined => match datatype {
            Datatype::FixedPoint {
                signed: true,
                byte_order,
                ..
            } => {
                let min = match size {
                    1 => i8::MIN as i64,
                    2 => i16::MIN as i64,
                    4 => i32::MIN as i64,
                    _ => i64::MIN,
                };
                ordered(min.to_le_bytes(), size, *byte_order)
            }
            Datatype::FloatingPoint { byte_order, .. } if size == 4 => {
                ordered(u64::from(f32::NAN.to_bits()).to_le_bytes(), 4, *byte_order)
            }
            Datatype::FloatingPoint { byte_order, .. } => {
                ordered(f64::NAN.to_bits().to_le_bytes(), 8, *byte_order)
            }
            Datatype::String { .. } | Datatype::VariableLength { .. } => vec![0],
            _ => vec![0xFF],
        },
    }
}

/// The dataset's logical byte stream, fill-backed where nothing was stored.
pub fn read_raw(file: &[u8], info: &DatasetInfo) -> Result<Vec<u8>, FormatError> {
    let total = to_usize(info.byte_len()?)?;
    let pattern = fill_pattern(&info.datatype, &info.fill_value);
    let mut out: Vec<u8> = pattern.iter().copied().cycle().take(total).collect();

    match &info.layout {
        DataLayout::Contiguous { address: None, .. } => {
            tracing::debug!("contiguous storage never allocated");
        }
        DataLayout::Contiguous {
            address: Some(address),
            size,
        } => {
            let size = to_usize(*size)?;
            if size > total {
                return Err(FormatError::corrupted(format!(
                    "contiguous storage of {size} bytes for a {total}-byte dataset"
                )));
            }
            if size < total {
                tracing::debug!(size, total, "contiguous storage shorter than dataset");
            }
            out[..size].copy_from_slice(slice_at(file, *address, size as u64)?);
        }
        DataLayout::Chunked {
            chunk_dims,
            element_size,
            index,
        } => {
            let esize = info.datatype.size() as usize;
            if *element_size != esize as u64 {
                tracing::warn!(
                    layout = element_size,
                    datatype = esize,
                    "chunk element size differs from datatype size"
                );
            }
            let grid = ChunkGrid {
                dims: &info.dataspace.dimensions,
                chunk_dims,
                element_size: esize,
            };
            read_chunked(file, index, &grid, &info.filters, &mut out)?;
        }
    }

    if out.len() != total {
        return Err(FormatError::corrupted(format!(
            "assembled {} bytes, expected {total}",
            out.len()
        )));
    }
    Ok(out)
}

/// Read and decode a dataset. Scalar dataspaces give one value, null
/// dataspaces an empty `Seq`, simple ones a `Seq` nesting per dimension.
pub fn materialize(
    file: &[u8],
    info: &DatasetInfo,
    decoder: &mut ValueDecoder<'_>,
) -> Result<Value, FormatError> {
    if info.dataspace.space_type == DataspaceType::Null {
        return Ok(Value::Seq(Vec::new()));
    }
    let raw = read_raw(file, info)?;
    decoder.decode_array(&info.datatype, &info.dataspace.dimensions, &raw)
}
