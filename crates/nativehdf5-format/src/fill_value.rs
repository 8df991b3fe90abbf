//! Fill value messages: the old form (0x0004) and the new form (0x0005).

use crate::bytes::{read_u32, read_u8, slice};
use crate::error::FormatError;

/// What unwritten dataset elements hold.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FillValue {
    /// No fill value recorded; unwritten elements are zero.
    #[default]
    Default,
    /// The writer marked the fill value undefined; readers substitute a
    /// type-appropriate sentinel.
    Undefined,
    /// Explicit fill bytes, one element's worth.
    Bytes(Vec<u8>),
}

impl FillValue {
    /// Parse the old fill value message: a 4-byte size followed by the bytes.
    pub fn parse_old(data: &[u8]) -> Result<FillValue, FormatError> {
        let size = read_u32(data, 0)? as usize;
        Ok(Self::from_bytes(slice(data, 4, size)?))
    }

    /// Parse the new fill value message, versions 1 to 3.
    pub fn parse(data: &[u8]) -> Result<FillValue, FormatError> {
        let version = read_u8(data, 0)?;
        let (alloc_time, write_time, has_value, pos) = match version {
            1 | 2 => {
                let alloc_time = read_u8(data, 1)?;
                let write_time = read_u8(data, 2)?;
                let defined = read_u8(data, 3)? != 0;
                // v1 always stores the size field
                (alloc_time, write_time, version == 1 || defined, 4)
            }
            3 => {
                let flags = read_u8(data, 1)?;
                if flags & 0xC0 != 0 {
                    tracing::warn!(flags, "reserved fill value flags set");
                }
                let undefined = flags & 0x10 != 0;
                let defined = flags & 0x20 != 0;
                if undefined && defined {
                    return Err(FormatError::corrupted(
                        "fill value is both defined and undefined",
                    ));
                }
                if undefined {
                    return Ok(FillValue::Undefined);
                }
                (flags & 0x03, (flags >> 2) & 0x03, defined, 2)
            }
            v => {
                return Err(FormatError::UnsupportedVersion {
                    structure: "fill value",
                    version: v,
                })
            }
        };
        if !(1..=3).contains(&alloc_time) {
            tracing::warn!(alloc_time, "unexpected space allocation time");
        }
        if write_time > 2 {
            tracing::warn!(write_time, "unexpected fill value write time");
        }
        if !has_value {
            return Ok(FillValue::Default);
        }
        let size = read_u32(data, pos)? as usize;
        Ok(Self::from_bytes(slice(data, pos + 4, size)?))
    }

    fn from_bytes(bytes: &[u8]) -> FillValue {
        if bytes.is_empty() {
            FillValue::Default
        } else {
            FillValue::Bytes(bytes.to_vec())
        }
    }

    /// Pick the value an object actually uses: the new message wins over
    /// the old one.
    pub fn select(new: Option<FillValue>, old: Option<FillValue>) -> FillValue {
        new.or(old).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn old_form() {
        let data = [2, 0, 0, 0, 0xAB, 0xCD];
        assert_eq!(
            FillValue::parse_old(&data).unwrap(),
            FillValue::Bytes(vec![0xAB, 0xCD])
        );
        assert_eq!(FillValue::parse_old(&[0, 0, 0, 0]).unwrap(), FillValue::Default);
    }

    #[test]
    fn v2_undefined_flag_means_default() {
        assert_eq!(FillValue::parse(&[2, 2, 2, 0]).unwrap(), FillValue::Default);
        let data = [2, 2, 2, 1, 1, 0, 0, 0, 0xAB];
        assert_eq!(FillValue::parse(&data).unwrap(), FillValue::Bytes(vec![0xAB]));
    }

    #[test]
    fn v1_always_has_size() {
        let data = [1, 1, 0, 0, 4, 0, 0, 0, 1, 2, 3, 4];
        assert_eq!(
            FillValue::parse(&data).unwrap(),
            FillValue::Bytes(vec![1, 2, 3, 4])
        );
    }

    #[test]
    fn v3_flags() {
        assert_eq!(FillValue::parse(&[3, 0x10 | 0x02]).unwrap(), FillValue::Undefined);
        assert_eq!(FillValue::parse(&[3, 0x02]).unwrap(), FillValue::Default);
        let data = [3, 0x20 | 0x02, 1, 0, 0, 0, 0xAB];
        assert_eq!(FillValue::parse(&data).unwrap(), FillValue::Bytes(vec![0xAB]));
        let err = FillValue::parse(&[3, 0x30]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn new_form_wins() {
        let chosen = FillValue::select(
            Some(FillValue::Undefined),
            Some(FillValue::Bytes(vec![1])),
        );
        assert_eq!(chosen, FillValue::Undefined);
        assert_eq!(
            FillValue::select(None, Some(FillValue::Bytes(vec![1]))),
            FillValue::Bytes(vec![1])
        );
        assert_eq!(FillValue::select(None, None), FillValue::Default);
    }
}
