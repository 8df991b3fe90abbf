//! Group info message parsing (message type 0x000A).

use crate::bytes::{read_u16, read_u8};
use crate::error::FormatError;

/// Storage thresholds of a new-style group. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupInfoMessage {
    pub max_compact: Option<u16>,
    pub min_dense: Option<u16>,
    pub estimated_entries: Option<u16>,
    pub estimated_name_length: Option<u16>,
}

impl GroupInfoMessage {
    pub fn parse(data: &[u8]) -> Result<GroupInfoMessage, FormatError> {
        let version = read_u8(data, 0)?;
        if version != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "group info",
                version,
            });
        }
        let flags = read_u8(data, 1)?;
        let mut info = GroupInfoMessage::default();
        let mut pos = 2;
        if flags & 0x01 != 0 {
            info.max_compact = Some(read_u16(data, pos)?);
            info.min_dense = Some(read_u16(data, pos + 2)?);
            pos += 4;
        }
        if flags & 0x02 != 0 {
            info.estimated_entries = Some(read_u16(data, pos)?);
            info.estimated_name_length = Some(read_u16(data, pos + 2)?);
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_fields() {
        let info = GroupInfoMessage::parse(&[0, 3, 8, 0, 6, 0, 4, 0, 16, 0]).unwrap();
        assert_eq!(info.max_compact, Some(8));
        assert_eq!(info.min_dense, Some(6));
        assert_eq!(info.estimated_entries, Some(4));
        assert_eq!(info.estimated_name_length, Some(16));
    }

    #[test]
    fn no_fields() {
        assert_eq!(GroupInfoMessage::parse(&[0, 0]).unwrap(), GroupInfoMessage::default());
    }
}
