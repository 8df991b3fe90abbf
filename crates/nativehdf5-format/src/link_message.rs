//! Link message parsing (message type 0x0006).
//!
//! The same encoding is used for links stored directly in a group's header
//! and for links stored as fractal heap objects in dense groups.

use crate::bytes::{read_u64, read_u8, read_uint, slice};
use crate::datatype::CharacterSet;
use crate::error::FormatError;

/// A hard link to a child object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMessage {
    /// Name of this link.
    pub name: String,
    /// Address of the target's object header.
    pub address: u64,
    /// Creation order, if tracked.
    pub creation_order: Option<u64>,
    /// Character set of the link name.
    pub charset: CharacterSet,
}

impl LinkMessage {
    pub fn parse(data: &[u8]) -> Result<LinkMessage, FormatError> {
        let version = read_u8(data, 0)?;
        if version != 1 {
            return Err(FormatError::UnsupportedVersion {
                structure: "link",
                version,
            });
        }
        let flags = read_u8(data, 1)?;
        let mut pos = 2;

        let link_type = if flags & 0x08 != 0 {
            let t = read_u8(data, pos)?;
            pos += 1;
            t
        } else {
            0
        };

        let creation_order = if flags & 0x04 != 0 {
            let co = read_u64(data, pos)?;
            pos += 8;
            Some(co)
        } else {
            None
        };

        let charset = if flags & 0x10 != 0 {
            let c = read_u8(data, pos)?;
            pos += 1;
            if c == 1 {
                CharacterSet::Utf8
            } else {
                CharacterSet::Ascii
            }
        } else {
            CharacterSet::Ascii
        };

        let width = 1usize << (flags & 0x03);
        let name_len = read_uint(data, pos, width)? as usize;
        pos += width;
        let name = String::from_utf8_lossy(slice(data, pos, name_len)?).into_owned();
        pos += name_len;

        match link_type {
            0 => {}
            1 => return Err(FormatError::unsupported(format!("soft link \"{name}\""))),
            64 => return Err(FormatError::unsupported(format!("external link \"{name}\""))),
            t => {
                return Err(FormatError::unsupported(format!(
                    "user-defined link type {t} for \"{name}\""
                )))
            }
        }

        let address = read_u64(data, pos)?;
        Ok(LinkMessage {
            name,
            address,
            creation_order,
            charset,
        })
    }
}
