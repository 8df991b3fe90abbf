//! Filter pipeline message parsing (message type 0x000B).

use crate::bytes::{pad8, read_u16, read_u32, read_u8, slice};
use crate::error::FormatError;

pub const FILTER_DEFLATE: u16 = 1;
pub const FILTER_SHUFFLE: u16 = 2;
pub const FILTER_FLETCHER32: u16 = 3;

/// One filter of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescription {
    pub filter_id: u16,
    pub name: Option<String>,
    /// Bit 0: the filter is optional.
    pub flags: u16,
    pub client_data: Vec<u32>,
}

/// The filters applied to every chunk of a dataset, in write order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterPipeline {
    pub version: u8,
    pub filters: Vec<FilterDescription>,
}

fn read_name(data: &[u8], pos: usize, len: usize) -> Result<String, FormatError> {
    let raw = slice(data, pos, len)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

impl FilterPipeline {
    /// Parse a pipeline, rejecting filters other than deflate, shuffle
    /// and fletcher32.
    pub fn parse(data: &[u8]) -> Result<FilterPipeline, FormatError> {
        let version = read_u8(data, 0)?;
        let count = read_u8(data, 1)? as usize;
        let mut pos = match version {
            // version(1) + count(1) + reserved(6)
            1 => 8,
            2 => 2,
            v => {
                return Err(FormatError::UnsupportedVersion {
                    structure: "filter pipeline",
                    version: v,
                })
            }
        };

        let mut filters = Vec::with_capacity(count);
        for _ in 0..count {
            let filter_id = read_u16(data, pos)?;
            pos += 2;
            let name_len = if version == 1 || filter_id >= 256 {
                let n = read_u16(data, pos)? as usize;
                pos += 2;
                n
            } else {
                0
            };
            let flags = read_u16(data, pos)?;
            let num_values = read_u16(data, pos + 2)? as usize;
            pos += 4;

            let name = if name_len > 0 {
                let name = read_name(data, pos, name_len)?;
                pos += if version == 1 { pad8(name_len) } else { name_len };
                Some(name)
            } else {
                None
            };

            let mut client_data = Vec::with_capacity(num_values);
            for _ in 0..num_values {
                client_data.push(read_u32(data, pos)?);
                pos += 4;
            }
            if version == 1 && num_values % 2 == 1 {
                pos += 4;
            }

            if !matches!(filter_id, FILTER_DEFLATE | FILTER_SHUFFLE | FILTER_FLETCHER32) {
                return Err(FormatError::UnsupportedFilter(filter_id));
            }
            filters.push(FilterDescription {
                filter_id,
                name,
                flags,
                client_data,
            });
        }

        Ok(FilterPipeline { version, filters })
    }

    /// Index of `filter_id` in the pipeline.
    pub fn position(&self, filter_id: u16) -> Option<usize> {
        self.filters.iter().position(|f| f.filter_id == filter_id)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
