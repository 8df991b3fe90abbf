//! Link info message parsing (message type 0x0002).

use crate::bytes::{read_address, read_u64, read_u8};
use crate::error::FormatError;

/// Where a new-style group keeps its links.
///
/// With no fractal heap address the group is compact and its links are
/// stored as link messages in its own header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfoMessage {
    pub max_creation_order: Option<u64>,
    pub fractal_heap_address: Option<u64>,
    pub name_index_address: Option<u64>,
    pub creation_order_index_address: Option<u64>,
}

impl LinkInfoMessage {
    pub fn parse(data: &[u8]) -> Result<LinkInfoMessage, FormatError> {
        let version = read_u8(data, 0)?;
        if version != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "link info",
                version,
            });
        }
        let flags = read_u8(data, 1)?;
        let mut pos = 2;

        let max_creation_order = if flags & 0x01 != 0 {
            let v = read_u64(data, pos)?;
            pos += 8;
            Some(v)
        } else {
            None
        };
        let fractal_heap_address = read_address(data, pos)?;
        let name_index_address = read_address(data, pos + 8)?;
        pos += 16;
        let creation_order_index_address = if flags & 0x02 != 0 {
            read_address(data, pos)?
        } else {
            None
        };

        Ok(LinkInfoMessage {
            max_creation_order,
            fractal_heap_address,
            name_index_address,
            creation_order_index_address,
        })
    }

    /// Whether links live in a fractal heap rather than in the header.
    pub fn is_dense(&self) -> bool {
        self.fractal_heap_address.is_some()
    }
}
