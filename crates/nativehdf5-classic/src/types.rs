//! Classic external types and attribute values.

use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};
use nativehdf5_format::Value;

use crate::error::WriteError;

/// External data types of the classic format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NcType {
    Byte,
    Char,
    Short,
    Int,
    Float,
    Double,
    UByte,
    UShort,
    UInt,
    Int64,
    UInt64,
}

impl NcType {
    /// The `nc_type` code written to the header.
    pub fn code(self) -> u32 {
        match self {
            NcType::Byte => 1,
            NcType::Char => 2,
            NcType::Short => 3,
            NcType::Int => 4,
            NcType::Float => 5,
            NcType::Double => 6,
            NcType::UByte => 7,
            NcType::UShort => 8,
            NcType::UInt => 9,
            NcType::Int64 => 10,
            NcType::UInt64 => 11,
        }
    }

    pub fn size(self) -> u64 {
        match self {
            NcType::Byte | NcType::Char | NcType::UByte => 1,
            NcType::Short | NcType::UShort => 2,
            NcType::Int | NcType::Float | NcType::UInt => 4,
            NcType::Double | NcType::Int64 | NcType::UInt64 => 8,
        }
    }

    /// Types that only CDF-5 can hold.
    pub fn requires_cdf5(self) -> bool {
        matches!(
            self,
            NcType::UByte | NcType::UShort | NcType::UInt | NcType::Int64 | NcType::UInt64
        )
    }

    /// The classic type of a value leaf.
    pub(crate) fn of_leaf(value: &Value) -> Option<NcType> {
        Some(match value {
            Value::Int8(_) => NcType::Byte,
            Value::Int16(_) => NcType::Short,
            Value::Int32(_) => NcType::Int,
            Value::Float32(_) => NcType::Float,
            Value::Float64(_) => NcType::Double,
            Value::UInt8(_) => NcType::UByte,
            Value::UInt16(_) => NcType::UShort,
            Value::UInt32(_) => NcType::UInt,
            Value::Int64(_) => NcType::Int64,
            Value::UInt64(_) => NcType::UInt64,
            Value::Str(_) => NcType::Char,
            _ => return None,
        })
    }
}

/// Big-endian encoding of one leaf. Strings write their bytes unpadded.
pub(crate) fn write_leaf<W: Write>(w: &mut W, value: &Value) -> io::Result<()> {
    match value {
        Value::Int8(v) => w.write_i8(*v),
        Value::Int16(v) => w.write_i16::<BigEndian>(*v),
        Value::Int32(v) => w.write_i32::<BigEndian>(*v),
        Value::Float32(v) => w.write_f32::<BigEndian>(*v),
        Value::Float64(v) => w.write_f64::<BigEndian>(*v),
        Value::UInt8(v) => w.write_u8(*v),
        Value::UInt16(v) => w.write_u16::<BigEndian>(*v),
        Value::UInt32(v) => w.write_u32::<BigEndian>(*v),
        Value::Int64(v) => w.write_i64::<BigEndian>(*v),
        Value::UInt64(v) => w.write_u64::<BigEndian>(*v),
        Value::Str(s) => w.write_all(s.as_bytes()),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no classic encoding for {other:?}"),
        )),
    }
}

/// An attribute value. Every variant holds one or more elements.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
}

impl AttrValue {
    pub fn nc_type(&self) -> NcType {
        match self {
            AttrValue::Text(_) => NcType::Char,
            AttrValue::I8(_) => NcType::Byte,
            AttrValue::I16(_) => NcType::Short,
            AttrValue::I32(_) => NcType::Int,
            AttrValue::F32(_) => NcType::Float,
            AttrValue::F64(_) => NcType::Double,
            AttrValue::U8(_) => NcType::UByte,
            AttrValue::U16(_) => NcType::UShort,
            AttrValue::U32(_) => NcType::UInt,
            AttrValue::I64(_) => NcType::Int64,
            AttrValue::U64(_) => NcType::UInt64,
        }
    }

    /// Number of elements; bytes for text.
    pub fn len(&self) -> usize {
        match self {
            AttrValue::Text(s) => s.len(),
            AttrValue::I8(v) => v.len(),
            AttrValue::I16(v) => v.len(),
            AttrValue::I32(v) => v.len(),
            AttrValue::F32(v) => v.len(),
            AttrValue::F64(v) => v.len(),
            AttrValue::U8(v) => v.len(),
            AttrValue::U16(v) => v.len(),
            AttrValue::U32(v) => v.len(),
            AttrValue::I64(v) => v.len(),
            AttrValue::U64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Big-endian element bytes, without padding.
    pub(crate) fn write_values<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            AttrValue::Text(s) => w.write_all(s.as_bytes()),
            AttrValue::I8(v) => v.iter().try_for_each(|&x| w.write_i8(x)),
            AttrValue::I16(v) => v.iter().try_for_each(|&x| w.write_i16::<BigEndian>(x)),
            AttrValue::I32(v) => v.iter().try_for_each(|&x| w.write_i32::<BigEndian>(x)),
            AttrValue::F32(v) => v.iter().try_for_each(|&x| w.write_f32::<BigEndian>(x)),
            AttrValue::F64(v) => v.iter().try_for_each(|&x| w.write_f64::<BigEndian>(x)),
            AttrValue::U8(v) => w.write_all(v),
            AttrValue::U16(v) => v.iter().try_for_each(|&x| w.write_u16::<BigEndian>(x)),
            AttrValue::U32(v) => v.iter().try_for_each(|&x| w.write_u32::<BigEndian>(x)),
            AttrValue::I64(v) => v.iter().try_for_each(|&x| w.write_i64::<BigEndian>(x)),
            AttrValue::U64(v) => v.iter().try_for_each(|&x| w.write_u64::<BigEndian>(x)),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

macro_rules! collect_leaves {
    ($leaves:expr, $variant:ident, $attr:ident) => {
        $leaves
            .iter()
            .map(|v| match v {
                Value::$variant(x) => Some(*x),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(AttrValue::$attr)
    };
}

/// Converts a decoded attribute: a single string, or numbers of one type.
impl TryFrom<&Value> for AttrValue {
    type Error = WriteError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let leaves = value.flatten();
        let first = leaves
            .first()
            .copied()
            .ok_or_else(|| WriteError::Attribute("empty value".into()))?;
        let converted = match first {
            Value::Str(s) if leaves.len() == 1 => Some(AttrValue::Text(s.clone())),
            Value::Int8(_) => collect_leaves!(leaves, Int8, I8),
            Value::Int16(_) => collect_leaves!(leaves, Int16, I16),
            Value::Int32(_) => collect_leaves!(leaves, Int32, I32),
            Value::Float32(_) => collect_leaves!(leaves, Float32, F32),
            Value::Float64(_) => collect_leaves!(leaves, Float64, F64),
            Value::UInt8(_) => collect_leaves!(leaves, UInt8, U8),
            Value::UInt16(_) => collect_leaves!(leaves, UInt16, U16),
            Value::UInt32(_) => collect_leaves!(leaves, UInt32, U32),
            Value::Int64(_) => collect_leaves!(leaves, Int64, I64),
            Value::UInt64(_) => collect_leaves!(leaves, UInt64, U64),
            _ => None,
        };
        converted.ok_or_else(|| WriteError::Attribute(format!("no classic form for {value:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_decoded_values() {
        let v = Value::Seq(vec![Value::Int32(1), Value::Int32(-2)]);
        assert_eq!(AttrValue::try_from(&v).unwrap(), AttrValue::I32(vec![1, -2]));
        assert_eq!(
            AttrValue::try_from(&Value::Str("K".into())).unwrap(),
            AttrValue::Text("K".into())
        );
        assert_eq!(
            AttrValue::try_from(&Value::UInt64(7)).unwrap().nc_type(),
            NcType::UInt64
        );
    }

    #[test]
    fn rejects_what_classic_cannot_hold() {
        let mixed = Value::Seq(vec![Value::Int32(1), Value::Float32(2.0)]);
        assert!(matches!(AttrValue::try_from(&mixed), Err(WriteError::Attribute(_))));
        let strings = Value::Seq(vec![Value::Str("a".into()), Value::Str("b".into())]);
        assert!(AttrValue::try_from(&strings).is_err());
        assert!(AttrValue::try_from(&Value::Seq(vec![])).is_err());
        assert!(AttrValue::try_from(&Value::Reference(8)).is_err());
    }

    #[test]
    fn big_endian_values() {
        let mut out = Vec::new();
        AttrValue::I16(vec![1, -1]).write_values(&mut out).unwrap();
        assert_eq!(out, [0, 1, 0xFF, 0xFF]);
        assert!(NcType::UShort.requires_cdf5());
        assert!(!NcType::Double.requires_cdf5());
    }
}
