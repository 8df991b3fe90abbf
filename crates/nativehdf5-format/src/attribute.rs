//! Attribute message parsing (message type 0x000C).

use crate::bytes::{ensure_len, pad8, read_u16, slice, to_usize};
use crate::dataspace::Dataspace;
use crate::datatype::{CharacterSet, Datatype};
use crate::error::FormatError;
use crate::shared_message::{SharedMessage, SharedTable};

/// A parsed attribute message. `raw_data` holds exactly one element per
/// dataspace element.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMessage {
    pub name: String,
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    pub name_charset: CharacterSet,
    pub raw_data: Vec<u8>,
}

fn extract_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

impl AttributeMessage {
    /// Parse an attribute message. Shared datatypes are resolved through
    /// `shared`, which needs the whole file.
    pub fn parse(
        data: &[u8],
        file: &[u8],
        shared: &mut SharedTable,
    ) -> Result<AttributeMessage, FormatError> {
        ensure_len(data, 0, 8)?;
        let version = data[0];
        let flags = data[1];
        let name_size = read_u16(data, 2)? as usize;
        let datatype_size = read_u16(data, 4)? as usize;
        let dataspace_size = read_u16(data, 6)? as usize;

        let (mut pos, name_charset) = match version {
            1 | 2 => (8, CharacterSet::Ascii),
            3 => {
                let charset = match data.get(8) {
                    Some(1) => CharacterSet::Utf8,
                    Some(_) => CharacterSet::Ascii,
                    None => {
                        return Err(FormatError::UnexpectedEof {
                            expected: 9,
                            available: data.len(),
                        })
                    }
                };
                (9, charset)
            }
            v => {
                return Err(FormatError::UnsupportedVersion {
                    structure: "attribute",
                    version: v,
                })
            }
        };
        // v1 pads every field to a multiple of 8
        let step = |n: usize| if version == 1 { pad8(n) } else { n };
        if version == 1 && flags != 0 {
            tracing::warn!(flags, "reserved attribute flags set");
        }

        let name = extract_name(slice(data, pos, name_size)?);
        pos += step(name_size);

        let dt_bytes = slice(data, pos, datatype_size)?;
        let datatype = if version > 1 && flags & 0x01 != 0 {
            let reference = SharedMessage::parse(dt_bytes)?;
            shared.datatype(file, reference.address)?
        } else {
            Datatype::parse(dt_bytes)?.0
        };
        pos += step(datatype_size);

        if version > 1 && flags & 0x02 != 0 {
            return Err(FormatError::unsupported("shared attribute dataspace"));
        }
        let dataspace = Dataspace::parse(slice(data, pos, dataspace_size)?)?;
        pos += step(dataspace_size);

        let total = dataspace
            .num_elements()?
            .checked_mul(datatype.size() as u64)
            .ok_or_else(|| FormatError::corrupted("attribute size overflows"))?;
        let raw_data = slice(data, pos, to_usize(total)?)?.to_vec();

        Ok(AttributeMessage {
            name,
            datatype,
            dataspace,
            name_charset,
            raw_data,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::datatype::tests::{fixed_point, fixed_string};
    use crate::error::ErrorKind;

    pub(crate) fn scalar_space() -> Vec<u8> {
        vec![2, 0, 0, 0]
    }

    pub(crate) fn simple_space(dims: &[u64]) -> Vec<u8> {
        let mut buf = vec![2, dims.len() as u8, 0, 1];
        for d in dims {
            buf.extend_from_slice(&d.to_le_bytes());
        }
        buf
    }

    /// Version 3 attribute message.
    pub(crate) fn build_attribute(name: &str, dt: &[u8], space: &[u8], value: &[u8]) -> Vec<u8> {
        let mut buf = vec![3, 0];
        buf.extend_from_slice(&((name.len() + 1) as u16).to_le_bytes());
        buf.extend_from_slice(&(dt.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(space.len() as u16).to_le_bytes());
        buf.push(0);
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(dt);
        buf.extend_from_slice(space);
        buf.extend_from_slice(value);
        buf
    }

    #[test]
    fn v3_string_attribute_exact_bytes() {
        let data = build_attribute("title", &fixed_string(5, 0), &scalar_space(), b"hello");
        let attr = AttributeMessage::parse(&data, &[], &mut SharedTable::new()).unwrap();
        assert_eq!(attr.name, "title");
        assert_eq!(attr.raw_data, b"hello");
    }

    #[test]
    fn v1_fields_padded() {
        let dt = fixed_point(2, true, false);
        let space = [1u8, 1, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0];
        let mut data = vec![1, 0];
        data.extend_from_slice(&3u16.to_le_bytes()); // "ab\0"
        data.extend_from_slice(&(dt.len() as u16).to_le_bytes());
        data.extend_from_slice(&(space.len() as u16).to_le_bytes());
        data.extend_from_slice(b"ab\0\0\0\0\0\0");
        data.extend_from_slice(&dt);
        data.extend_from_slice(&[0u8; 4]); // 12 -> 16
        data.extend_from_slice(&space);
        data.extend_from_slice(&[1, 0, 2, 0, 3, 0]);

        let attr = AttributeMessage::parse(&data, &[], &mut SharedTable::new()).unwrap();
        assert_eq!(attr.name, "ab");
        assert_eq!(attr.dataspace.dimensions, vec![3]);
        assert_eq!(attr.raw_data, vec![1, 0, 2, 0, 3, 0]);
    }

    #[test]
    fn short_value_is_corruption() {
        let data = build_attribute("n", &fixed_point(4, true, false), &simple_space(&[2]), &[0; 6]);
        let err = AttributeMessage::parse(&data, &[], &mut SharedTable::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn overflowing_dataspace_is_corruption() {
        let space = simple_space(&[1 << 32, 1 << 32, 1 << 32]);
        let data = build_attribute("n", &fixed_point(4, true, false), &space, &[]);
        let err = AttributeMessage::parse(&data, &[], &mut SharedTable::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn unknown_version() {
        let mut data = build_attribute("n", &fixed_point(1, false, false), &scalar_space(), &[7]);
        data[0] = 4;
        let err = AttributeMessage::parse(&data, &[], &mut SharedTable::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
    }
}
