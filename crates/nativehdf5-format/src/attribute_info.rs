//! Attribute info message parsing (message type 0x0015).

use crate::bytes::{read_address, read_u16, read_u8};
use crate::error::FormatError;

/// Dense attribute storage for an object: a fractal heap of attribute
/// messages indexed by a version 2 B-tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfoMessage {
    pub max_creation_index: Option<u16>,
    pub fractal_heap_address: Option<u64>,
    pub name_index_address: Option<u64>,
    pub creation_order_index_address: Option<u64>,
}

impl AttributeInfoMessage {
    pub fn parse(data: &[u8]) -> Result<AttributeInfoMessage, FormatError> {
        let version = read_u8(data, 0)?;
        if version != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "attribute info",
                version,
            });
        }
        let flags = read_u8(data, 1)?;
        let mut pos = 2;

        let max_creation_index = if flags & 0x01 != 0 {
            let v = read_u16(data, pos)?;
            pos += 2;
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

        Ok(AttributeInfoMessage {
            max_creation_index,
            fractal_heap_address,
            name_index_address,
            creation_order_index_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_with_creation_index() {
        let mut data = vec![0, 0x03];
        data.extend_from_slice(&4u16.to_le_bytes());
        data.extend_from_slice(&0x500u64.to_le_bytes());
        data.extend_from_slice(&0x600u64.to_le_bytes());
        data.extend_from_slice(&0x700u64.to_le_bytes());
        let info = AttributeInfoMessage::parse(&data).unwrap();
        assert_eq!(info.max_creation_index, Some(4));
        assert_eq!(info.fractal_heap_address, Some(0x500));
        assert_eq!(info.creation_order_index_address, Some(0x700));
    }

    #[test]
    fn empty_storage() {
        let mut data = vec![0, 0];
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        let info = AttributeInfoMessage::parse(&data).unwrap();
        assert_eq!(info.fractal_heap_address, None);
    }

    #[test]
    fn bad_version() {
        let err = AttributeInfoMessage::parse(&[1, 0]).unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedVersion { .. }));
    }
}
