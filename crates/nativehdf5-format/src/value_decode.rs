//! Turning raw element bytes into [`Value`] trees.
//!
//! Variable-length elements point into global heap collections; the
//! decoder keeps every collection it has parsed so repeated lookups into
//! the same collection stay cheap.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

use crate::bytes::{checked_product, read_u32, read_u64, to_usize, UNDEFINED_ADDRESS};
use crate::datatype::{ByteOrder, Datatype, StringPadding};
use crate::error::FormatError;
use crate::global_heap::GlobalHeapCollection;
use crate::value::Value;

/// Size of one stored variable-length element: length, collection address
/// and object index.
pub const VLEN_ELEMENT_SIZE: usize = 16;

fn read_unsigned(raw: &[u8], order: ByteOrder) -> u64 {
    match order {
        ByteOrder::LittleEndian => LittleEndian::read_uint(raw, raw.len()),
        ByteOrder::BigEndian => BigEndian::read_uint(raw, raw.len()),
    }
}

fn read_signed(raw: &[u8], order: ByteOrder) -> i64 {
    match order {
        ByteOrder::LittleEndian => LittleEndian::read_int(raw, raw.len()),
        ByteOrder::BigEndian => BigEndian::read_int(raw, raw.len()),
    }
}

fn integer(raw: &[u8], order: ByteOrder, signed: bool) -> Result<Value, FormatError> {
    Ok(match (raw.len(), signed) {
        (1, true) => Value::Int8(raw[0] as i8),
        (2, true) => Value::Int16(read_signed(raw, order) as i16),
        (4, true) => Value::Int32(read_signed(raw, order) as i32),
        (8, true) => Value::Int64(read_signed(raw, order)),
        (1, false) => Value::UInt8(raw[0]),
        (2, false) => Value::UInt16(read_unsigned(raw, order) as u16),
        (4, false) => Value::UInt32(read_unsigned(raw, order) as u32),
        (8, false) => Value::UInt64(read_unsigned(raw, order)),
        (n, _) => return Err(FormatError::unsupported(format!("{n}-byte integer"))),
    })
}

/// Decode a fixed-length string element.
pub fn fixed_string(raw: &[u8], padding: StringPadding) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let mut s = &raw[..end];
    if padding == StringPadding::SpacePad {
        while let [rest @ .., b' '] = s {
            s = rest;
        }
    }
    String::from_utf8_lossy(s).into_owned()
}

/// Build nested `Seq`s of the given extents from row-major leaves.
pub fn nest(dims: &[u64], leaves: Vec<Value>) -> Result<Value, FormatError> {
    let expected = dims
        .iter()
        .try_fold(1u64, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| FormatError::corrupted("element count overflows"))?;
    if leaves.len() as u64 != expected {
        return Err(FormatError::corrupted(format!(
            "{} values for extents {dims:?}",
            leaves.len()
        )));
    }
    let mut iter = leaves.into_iter();
    nest_level(dims, &mut iter)
}

fn nest_level(dims: &[u64], leaves: &mut impl Iterator<Item = Value>) -> Result<Value, FormatError> {
    match dims.split_first() {
        None => leaves
            .next()
            .ok_or_else(|| FormatError::corrupted("ran out of values while nesting")),
        Some((&n, rest)) => {
            let mut items = Vec::with_capacity(to_usize(n)?);
            for _ in 0..n {
                items.push(nest_level(rest, leaves)?);
            }
            Ok(Value::Seq(items))
        }
    }
}

/// Decodes elements of any supported datatype.
pub struct ValueDecoder<'a> {
    file: &'a [u8],
    heaps: HashMap<u64, GlobalHeapCollection>,
}

impl<'a> ValueDecoder<'a> {
    pub fn new(file: &'a [u8]) -> ValueDecoder<'a> {
        ValueDecoder {
            file,
            heaps: HashMap::new(),
        }
    }

    /// Decode `product(dims)` consecutive elements and nest them by `dims`.
    /// Empty `dims` decodes one scalar element.
    pub fn decode_array(
        &mut self,
        datatype: &Datatype,
        dims: &[u64],
        raw: &[u8],
    ) -> Result<Value, FormatError> {
        let size = datatype.size() as usize;
        let count = to_usize(checked_product(dims.iter().copied(), "array")?)?;
        let needed = count
            .checked_mul(size)
            .ok_or_else(|| FormatError::corrupted("array size overflows"))?;
        if raw.len() < needed {
            return Err(FormatError::corrupted(format!(
                "{} bytes for {count} elements of {size} bytes",
                raw.len()
            )));
        }
        let mut leaves = Vec::with_capacity(count);
        for i in 0..count {
            leaves.push(self.decode_element(datatype, &raw[i * size..(i + 1) * size])?);
        }
        nest(dims, leaves)
    }

    /// Decode one element. `raw` must hold at least `datatype.size()` bytes.
    pub fn decode_element(&mut self, datatype: &Datatype, raw: &[u8]) -> Result<Value, FormatError> {
        let size = datatype.size() as usize;
        if raw.len() < size {
            return Err(FormatError::corrupted(format!(
                "{}-byte {} element in {} bytes",
                size,
                datatype.class_name(),
                raw.len()
            )));
        }
        let raw = &raw[..size];
        match datatype {
            Datatype::FixedPoint {
                byte_order, signed, ..
            } => integer(raw, *byte_order, *signed),
            Datatype::FloatingPoint { byte_order, .. } => Ok(match size {
                4 => Value::Float32(f32::from_bits(read_unsigned(raw, *byte_order) as u32)),
                _ => Value::Float64(f64::from_bits(read_unsigned(raw, *byte_order))),
            }),
            Datatype::BitField { byte_order, .. } => match size {
                1 | 2 | 4 | 8 => integer(raw, *byte_order, false),
                _ => Ok(Value::Opaque(raw.to_vec())),
            },
            Datatype::Time { .. } => Err(FormatError::unsupported("time datatype values")),
            Datatype::String { padding, .. } => Ok(Value::Str(fixed_string(raw, *padding))),
            Datatype::Opaque { .. } => Ok(Value::Opaque(raw.to_vec())),
            Datatype::Reference { .. } => Ok(Value::Reference(LittleEndian::read_u64(&raw[..8]))),
            Datatype::Enumeration { base_type, .. } => self.decode_element(base_type, raw),
            Datatype::Array {
                base_type,
                dimensions,
                ..
            } => {
                let dims: Vec<u64> = dimensions.iter().map(|&d| d as u64).collect();
                self.decode_array(base_type, &dims, raw)
            }
            Datatype::Compound { members, .. } => {
                let mut fields = Vec::with_capacity(members.len());
                for member in members {
                    let start = to_usize(member.byte_offset)?;
                    let end = start + member.datatype.size() as usize;
                    let bytes = raw.get(start..end).ok_or_else(|| {
                        FormatError::corrupted(format!(
                            "compound member \"{}\" at {start}..{end} exceeds {size}-byte element",
                            member.name
                        ))
                    })?;
                    fields.push((member.name.clone(), self.decode_element(&member.datatype, bytes)?));
                }
                Ok(Value::Compound(fields))
            }
            Datatype::VariableLength {
                is_string,
                padding,
                base_type,
                ..
            } => {
                if raw.len() < VLEN_ELEMENT_SIZE {
                    return Err(FormatError::corrupted(format!(
                        "{}-byte variable-length element",
                        raw.len()
                    )));
                }
                let length = read_u32(raw, 0)? as usize;
                let address = read_u64(raw, 4)?;
                let index = read_u32(raw, 12)?;
                if *is_string {
                    let bytes = self.heap_bytes(address, index, length, 1)?;
                    Ok(Value::Str(fixed_string(bytes, *padding)))
                } else {
                    let base = base_type.as_ref().clone();
                    let base_size = base.size() as usize;
                    let bytes = self.heap_bytes(address, index, length, base_size)?.to_vec();
                    let mut items = Vec::with_capacity(length);
                    for i in 0..length {
                        items.push(self.decode_element(&base, &bytes[i * base_size..])?);
                    }
                    Ok(Value::VarLen(items))
                }
            }
        }
    }

    /// The first `length * unit` bytes of a global heap object.
    fn heap_bytes(
        &mut self,
        address: u64,
        index: u32,
        length: usize,
        unit: usize,
    ) -> Result<&[u8], FormatError> {
        if length == 0 {
            return Ok(&[]);
        }
        if address == UNDEFINED_ADDRESS || address == 0 {
            return Err(FormatError::corrupted(format!(
                "variable-length element of {length} items without heap storage"
            )));
        }
        if !self.heaps.contains_key(&address) {
            let heap = GlobalHeapCollection::parse(self.file, address)?;
            tracing::trace!(address, "cached global heap collection");
            self.heaps.insert(address, heap);
        }
        let heap = self
            .heaps
            .get(&address)
            .ok_or_else(|| FormatError::corrupted("global heap cache miss"))?;
        let object = heap.object(index)?;
        let needed = length
            .checked_mul(unit)
            .ok_or_else(|| FormatError::corrupted("variable-length size overflows"))?;
        object.get(..needed).ok_or_else(|| {
            FormatError::corrupted(format!(
                "global heap object {index} holds {} bytes, element needs {needed}",
                object.len()
            ))
        })
    }

    /// Number of global heap collections parsed so far.
    pub fn cached_heaps(&self) -> usize {
        self.heaps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::tests::{dt_header, fixed_point, float, fixed_string as string_dt, vlen_string};
    use crate::error::ErrorKind;
    use crate::global_heap::tests::build_collection;

    fn parse(bytes: &[u8]) -> Datatype {
        Datatype::parse(bytes).unwrap().0
    }

    fn vlen_ref(len: u32, address: u64, index: u32) -> Vec<u8> {
        let mut buf = len.to_le_bytes().to_vec();
        buf.extend_from_slice(&address.to_le_bytes());
        buf.extend_from_slice(&index.to_le_bytes());
        buf
    }

    #[test]
    fn integers_honor_order_and_sign() {
        let mut dec = ValueDecoder::new(&[]);
        let be = parse(&fixed_point(2, true, true));
        assert_eq!(dec.decode_element(&be, &[0xFF, 0xFE]).unwrap(), Value::Int16(-2));
        let le = parse(&fixed_point(4, false, false));
        assert_eq!(dec.decode_element(&le, &[1, 0, 0, 0]).unwrap(), Value::UInt32(1));
    }

    #[test]
    fn floats() {
        let mut dec = ValueDecoder::new(&[]);
        let be = parse(&float(8, true));
        assert_eq!(
            dec.decode_element(&be, &1.5f64.to_be_bytes()).unwrap(),
            Value::Float64(1.5)
        );
        let le = parse(&float(4, false));
        assert_eq!(
            dec.decode_element(&le, &(-0.25f32).to_le_bytes()).unwrap(),
            Value::Float32(-0.25)
        );
    }

    #[test]
    fn strings_trim_padding() {
        let mut dec = ValueDecoder::new(&[]);
        let nul = parse(&string_dt(8, 0));
        assert_eq!(
            dec.decode_element(&nul, b"abc\0\0\0\0\0").unwrap(),
            Value::Str("abc".into())
        );
        let space = parse(&string_dt(6, 2));
        assert_eq!(
            dec.decode_element(&space, b"ab    ").unwrap(),
            Value::Str("ab".into())
        );
        let exact = parse(&string_dt(5, 1));
        assert_eq!(
            dec.decode_element(&exact, b"hello").unwrap(),
            Value::Str("hello".into())
        );
    }

    #[test]
    fn array_nesting() {
        let mut dec = ValueDecoder::new(&[]);
        let dt = parse(&fixed_point(1, false, false));
        let v = dec.decode_array(&dt, &[2, 3], &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(v.shape(), vec![2, 3]);
        assert_eq!(
            v,
            Value::Seq(vec![
                Value::Seq(vec![Value::UInt8(1), Value::UInt8(2), Value::UInt8(3)]),
                Value::Seq(vec![Value::UInt8(4), Value::UInt8(5), Value::UInt8(6)]),
            ])
        );
        let empty = dec.decode_array(&dt, &[0], &[]).unwrap();
        assert_eq!(empty, Value::Seq(vec![]));
        assert_eq!(dec.decode_array(&dt, &[4], &[1, 2]).unwrap_err().kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn overflowing_array_dims() {
        let mut dec = ValueDecoder::new(&[]);
        let dt = parse(&fixed_point(1, false, false));
        let err = dec.decode_array(&dt, &[1 << 32, 1 << 32, 2], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn padded_compound_uses_member_offsets() {
        // { a: u8 @0, b: i32 @4 }, 8 bytes
        let mut bytes = dt_header(6, 3, [2, 0, 0], 8);
        bytes.extend_from_slice(b"a\0");
        bytes.push(0);
        bytes.extend(fixed_point(1, false, false));
        bytes.extend_from_slice(b"b\0");
        bytes.push(4);
        bytes.extend(fixed_point(4, true, false));
        let dt = parse(&bytes);

        let mut dec = ValueDecoder::new(&[]);
        let raw = [7, 0xEE, 0xEE, 0xEE, 0xFD, 0xFF, 0xFF, 0xFF];
        let v = dec.decode_element(&dt, &raw).unwrap();
        assert_eq!(v.field("a"), Some(&Value::UInt8(7)));
        assert_eq!(v.field("b"), Some(&Value::Int32(-3)));
    }

    #[test]
    fn enumeration_decodes_base_value() {
        let mut bytes = dt_header(8, 3, [2, 0, 0], 1);
        bytes.extend(fixed_point(1, false, false));
        bytes.extend_from_slice(b"LOW\0HIGH\0");
        bytes.extend_from_slice(&[0, 1]);
        let dt = parse(&bytes);
        let mut dec = ValueDecoder::new(&[]);
        assert_eq!(dec.decode_element(&dt, &[1]).unwrap(), Value::UInt8(1));
    }

    #[test]
    fn vlen_strings_and_sequences() {
        let mut file = vec![0u8; 8];
        file.extend(build_collection(&[b"hello\0", &[1, 0, 2, 0, 3, 0]]));

        let mut dec = ValueDecoder::new(&file);
        let s = parse(&vlen_string());
        assert_eq!(
            dec.decode_element(&s, &vlen_ref(5, 8, 1)).unwrap(),
            Value::Str("hello".into())
        );
        assert_eq!(
            dec.decode_element(&s, &vlen_ref(0, 0, 0)).unwrap(),
            Value::Str(String::new())
        );

        let mut seq = dt_header(9, 1, [0, 0, 0], 16);
        seq.extend(fixed_point(2, false, false));
        let seq = parse(&seq);
        assert_eq!(
            dec.decode_element(&seq, &vlen_ref(3, 8, 2)).unwrap(),
            Value::VarLen(vec![Value::UInt16(1), Value::UInt16(2), Value::UInt16(3)])
        );
        assert_eq!(dec.cached_heaps(), 1);

        let err = dec.decode_element(&seq, &vlen_ref(4, 8, 2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn references_and_time() {
        let mut dec = ValueDecoder::new(&[]);
        let r = parse(&dt_header(7, 1, [0, 0, 0], 8));
        assert_eq!(
            dec.decode_element(&r, &0x1234u64.to_le_bytes()).unwrap(),
            Value::Reference(0x1234)
        );
        let mut time = dt_header(2, 1, [0, 0, 0], 4);
        time.extend_from_slice(&32u16.to_le_bytes());
        let t = parse(&time);
        assert_eq!(
            dec.decode_element(&t, &[0; 4]).unwrap_err().kind(),
            ErrorKind::UnsupportedFeature
        );
    }
}
