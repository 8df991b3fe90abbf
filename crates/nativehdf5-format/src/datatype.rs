//! Datatype message parsing (message type 0x0003).
//!
//! Descriptors nest: compound members, enumeration and variable-length base
//! types, and array element types are themselves full datatype messages, so
//! [`Datatype::parse`] recurses and reports how many bytes it consumed.

use crate::bytes::{
    checked_product, ensure_len, pad8, read_cstr, read_u16, read_u32, read_u8, read_uint,
};
use crate::error::FormatError;

/// Byte order of numeric data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// String padding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringPadding {
    NullTerminate,
    NullPad,
    SpacePad,
}

/// Character set encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterSet {
    Ascii,
    Utf8,
}

/// A member of a compound datatype.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundMember {
    /// Member name.
    pub name: String,
    /// Byte offset within one compound element.
    pub byte_offset: u64,
    /// Member datatype.
    pub datatype: Datatype,
}

/// A member of an enumeration datatype.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    /// Member name.
    pub name: String,
    /// Raw value bytes (length = base type size).
    pub value: Vec<u8>,
}

/// Parsed datatype descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    /// Class 0: fixed-point integers.
    FixedPoint {
        size: u32,
        byte_order: ByteOrder,
        signed: bool,
        bit_offset: u16,
        bit_precision: u16,
    },
    /// Class 1: IEEE floating point. The bit-layout fields are recorded
    /// but decoding assumes the standard layout for `size`.
    FloatingPoint {
        size: u32,
        byte_order: ByteOrder,
        bit_offset: u16,
        bit_precision: u16,
        exponent_location: u8,
        exponent_size: u8,
        mantissa_location: u8,
        mantissa_size: u8,
        exponent_bias: u32,
    },
    /// Class 2: time.
    Time { size: u32, bit_precision: u16 },
    /// Class 3: fixed-length string.
    String {
        size: u32,
        padding: StringPadding,
        charset: CharacterSet,
    },
    /// Class 4: bit field.
    BitField {
        size: u32,
        byte_order: ByteOrder,
        bit_offset: u16,
        bit_precision: u16,
    },
    /// Class 5: opaque blob with an ASCII tag.
    Opaque { size: u32, tag: String },
    /// Class 6: compound.
    Compound {
        size: u32,
        members: Vec<CompoundMember>,
    },
    /// Class 7: object reference.
    Reference { size: u32 },
    /// Class 8: enumeration.
    Enumeration {
        size: u32,
        base_type: Box<Datatype>,
        members: Vec<EnumMember>,
    },
    /// Class 9: variable-length sequence or string.
    VariableLength {
        size: u32,
        is_string: bool,
        padding: StringPadding,
        charset: CharacterSet,
        base_type: Box<Datatype>,
    },
    /// Class 10: fixed-size array.
    Array {
        size: u32,
        base_type: Box<Datatype>,
        dimensions: Vec<u32>,
    },
}

fn parse_string_padding(val: u8) -> Result<StringPadding, FormatError> {
    match val {
        0 => Ok(StringPadding::NullTerminate),
        1 => Ok(StringPadding::NullPad),
        2 => Ok(StringPadding::SpacePad),
        _ => Err(FormatError::corrupted(format!("string padding type {val}"))),
    }
}

fn parse_charset(val: u8) -> Result<CharacterSet, FormatError> {
    match val {
        0 => Ok(CharacterSet::Ascii),
        1 => Ok(CharacterSet::Utf8),
        _ => Err(FormatError::corrupted(format!("character set {val}"))),
    }
}

fn integer_byte_order(bf0: u8) -> ByteOrder {
    if bf0 & 0x01 == 0 {
        ByteOrder::LittleEndian
    } else {
        ByteOrder::BigEndian
    }
}

/// Width of a v3 compound member offset, from the compound's total size.
fn offset_bytes_for_size(compound_size: u32) -> usize {
    match compound_size {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

/// Read a member name, padded to a multiple of 8 in v1/v2 descriptors.
fn read_member_name(data: &[u8], pos: usize, version: u8) -> Result<(String, usize), FormatError> {
    let (name, consumed) = read_cstr(data, pos)?;
    let consumed = if version < 3 { pad8(consumed) } else { consumed };
    ensure_len(data, pos, consumed)?;
    Ok((name, consumed))
}

fn parse_nested(data: &[u8], pos: usize) -> Result<(Datatype, usize), FormatError> {
    let rest = data.get(pos..).ok_or(FormatError::UnexpectedEof {
        expected: pos,
        available: data.len(),
    })?;
    Datatype::parse(rest)
}

impl Datatype {
    /// Parse a datatype message from raw bytes.
    ///
    /// Returns `(Datatype, bytes_consumed)` for recursive parsing.
    pub fn parse(data: &[u8]) -> Result<(Datatype, usize), FormatError> {
        // class_and_version(1) + 24-bit class bit field + size(4)
        ensure_len(data, 0, 8)?;

        let class_id = data[0] & 0x0F;
        let version = data[0] >> 4;
        if !(1..=3).contains(&version) {
            return Err(FormatError::UnsupportedVersion {
                structure: "datatype",
                version,
            });
        }

        let bf0 = data[1];
        let bf1 = data[2];
        let size = read_u32(data, 4)?;
        let mut pos = 8;

        let dt = match class_id {
            0 => {
                if !matches!(size, 1 | 2 | 4 | 8) {
                    return Err(FormatError::unsupported(format!("{size}-byte integer")));
                }
                let bit_offset = read_u16(data, pos)?;
                let bit_precision = read_u16(data, pos + 2)?;
                pos += 4;
                Datatype::FixedPoint {
                    size,
                    byte_order: integer_byte_order(bf0),
                    signed: bf0 & 0x08 != 0,
                    bit_offset,
                    bit_precision,
                }
            }
            1 => {
                // Byte order is bit 0 with bit 6 as the high bit; 2 and 3 are VAX.
                let byte_order = match ((bf0 >> 5) & 0x02) | (bf0 & 0x01) {
                    0 => ByteOrder::LittleEndian,
                    1 => ByteOrder::BigEndian,
                    _ => return Err(FormatError::unsupported("VAX floating-point byte order")),
                };
                if !matches!(size, 4 | 8) {
                    return Err(FormatError::unsupported(format!("{size}-byte float")));
                }
                ensure_len(data, pos, 12)?;
                let dt = Datatype::FloatingPoint {
                    size,
                    byte_order,
                    bit_offset: read_u16(data, pos)?,
                    bit_precision: read_u16(data, pos + 2)?,
                    exponent_location: data[pos + 4],
                    exponent_size: data[pos + 5],
                    mantissa_location: data[pos + 6],
                    mantissa_size: data[pos + 7],
                    exponent_bias: read_u32(data, pos + 8)?,
                };
                pos += 12;
                dt
            }
            2 => {
                let bit_precision = read_u16(data, pos)?;
                pos += 2;
                Datatype::Time {
                    size,
                    bit_precision,
                }
            }
            3 => Datatype::String {
                size,
                padding: parse_string_padding(bf0 & 0x0F)?,
                charset: parse_charset(bf0 >> 4)?,
            },
            4 => {
                let bit_offset = read_u16(data, pos)?;
                let bit_precision = read_u16(data, pos + 2)?;
                pos += 4;
                Datatype::BitField {
                    size,
                    byte_order: integer_byte_order(bf0),
                    bit_offset,
                    bit_precision,
                }
            }
            5 => {
                let tag_len = pad8(bf0 as usize);
                ensure_len(data, pos, tag_len)?;
                let raw = &data[pos..pos + tag_len];
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                let tag = String::from_utf8_lossy(&raw[..end]).into_owned();
                pos += tag_len;
                Datatype::Opaque { size, tag }
            }
            6 => {
                let num_members = u16::from_le_bytes([bf0, bf1]) as usize;
                let mut members = Vec::with_capacity(num_members);
                for _ in 0..num_members {
                    let (name, name_len) = read_member_name(data, pos, version)?;
                    pos += name_len;
                    let byte_offset;
                    let mut member_dims = Vec::new();
                    if version == 3 {
                        let width = offset_bytes_for_size(size);
                        byte_offset = read_uint(data, pos, width)?;
                        pos += width;
                    } else {
                        byte_offset = read_u32(data, pos)? as u64;
                        pos += 4;
                        if version == 1 {
                            // dimensionality(1) + reserved(3) + permutation(4)
                            // + reserved(4) + four dimension sizes(16)
                            let ndims = read_u8(data, pos)? as usize;
                            ensure_len(data, pos, 28)?;
                            for i in 0..ndims.min(4) {
                                member_dims.push(read_u32(data, pos + 12 + i * 4)?);
                            }
                            pos += 28;
                        }
                    }
                    let (mut datatype, consumed) = parse_nested(data, pos)?;
                    pos += consumed;
                    if !member_dims.is_empty() {
                        let count = checked_product(
                            member_dims.iter().map(|&d| d as u64),
                            "compound member array",
                        )?;
                        let size = count
                            .checked_mul(datatype.size() as u64)
                            .and_then(|s| u32::try_from(s).ok())
                            .ok_or_else(|| {
                                FormatError::corrupted(format!("member \"{name}\" array size overflows"))
                            })?;
                        datatype = Datatype::Array {
                            size,
                            base_type: Box::new(datatype),
                            dimensions: member_dims,
                        };
                    }
                    members.push(CompoundMember {
                        name,
                        byte_offset,
                        datatype,
                    });
                }
                Datatype::Compound { size, members }
            }
            7 => {
                match bf0 & 0x0F {
                    0 => {}
                    1 => return Err(FormatError::unsupported("dataset region references")),
                    t => return Err(FormatError::corrupted(format!("reference type {t}"))),
                }
                if size < 8 {
                    return Err(FormatError::corrupted(format!("{size}-byte object reference")));
                }
                Datatype::Reference { size }
            }
            8 => {
                let num_members = u16::from_le_bytes([bf0, bf1]) as usize;
                let (base_type, consumed) = parse_nested(data, pos)?;
                pos += consumed;
                let mut names = Vec::with_capacity(num_members);
                for _ in 0..num_members {
                    let (name, name_len) = read_member_name(data, pos, version)?;
                    pos += name_len;
                    names.push(name);
                }
                let base_size = base_type.size() as usize;
                ensure_len(data, pos, base_size * num_members)?;
                let members = names
                    .into_iter()
                    .map(|name| {
                        let value = data[pos..pos + base_size].to_vec();
                        pos += base_size;
                        EnumMember { name, value }
                    })
                    .collect();
                Datatype::Enumeration {
                    size,
                    base_type: Box::new(base_type),
                    members,
                }
            }
            9 => {
                let is_string = match bf0 & 0x0F {
                    0 => false,
                    1 => true,
                    t => return Err(FormatError::corrupted(format!("variable-length type {t}"))),
                };
                let padding = parse_string_padding((bf0 >> 4) & 0x0F)?;
                let charset = parse_charset(bf1 & 0x0F)?;
                let (base_type, consumed) = parse_nested(data, pos)?;
                pos += consumed;
                Datatype::VariableLength {
                    size,
                    is_string,
                    padding,
                    charset,
                    base_type: Box::new(base_type),
                }
            }
            10 => {
                let rank = read_u8(data, pos)? as usize;
                pos += if version < 3 { 4 } else { 1 };
                let mut dimensions = Vec::with_capacity(rank);
                for _ in 0..rank {
                    dimensions.push(read_u32(data, pos)?);
                    pos += 4;
                }
                if version < 3 {
                    // permutation indices
                    ensure_len(data, pos, rank * 4)?;
                    pos += rank * 4;
                }
                let (base_type, consumed) = parse_nested(data, pos)?;
                pos += consumed;
                Datatype::Array {
                    size,
                    base_type: Box::new(base_type),
                    dimensions,
                }
            }
            11 => return Err(FormatError::unsupported("complex datatype class")),
            c => return Err(FormatError::corrupted(format!("datatype class {c}"))),
        };

        Ok((dt, pos))
    }

    /// Size in bytes of one element of this type as stored in a dataset.
    pub fn size(&self) -> u32 {
        match self {
            Datatype::FixedPoint { size, .. }
            | Datatype::FloatingPoint { size, .. }
            | Datatype::Time { size, .. }
            | Datatype::String { size, .. }
            | Datatype::BitField { size, .. }
            | Datatype::Opaque { size, .. }
            | Datatype::Compound { size, .. }
            | Datatype::Reference { size }
            | Datatype::Enumeration { size, .. }
            | Datatype::VariableLength { size, .. }
            | Datatype::Array { size, .. } => *size,
        }
    }

    /// Short class name for diagnostics.
    pub fn class_name(&self) -> &'static str {
        match self {
            Datatype::FixedPoint { .. } => "fixed-point",
            Datatype::FloatingPoint { .. } => "floating-point",
            Datatype::Time { .. } => "time",
            Datatype::String { .. } => "string",
            Datatype::BitField { .. } => "bitfield",
            Datatype::Opaque { .. } => "opaque",
            Datatype::Compound { .. } => "compound",
            Datatype::Reference { .. } => "reference",
            Datatype::Enumeration { .. } => "enumeration",
            Datatype::VariableLength { .. } => "variable-length",
            Datatype::Array { .. } => "array",
        }
    }
}
