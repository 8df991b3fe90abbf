//! Dimension lengths and element type of a variable's value tree.

use std::io::{self, Write};

use nativehdf5_format::Value;

use crate::error::WriteError;
use crate::types::{write_leaf, NcType};

/// How a value tree maps onto a classic variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Shape {
    pub nc_type: NcType,
    /// Lengths, outermost first. Text adds a trailing string-length
    /// dimension.
    pub dims: Vec<u64>,
    /// Length every string is zero-padded to.
    pub string_len: Option<u64>,
}

impl Shape {
    /// Infer the shape of `values`. `named_dims` is the number of
    /// dimension names the caller supplied; `declared` types an empty
    /// value.
    pub fn infer(
        var: &str,
        values: &Value,
        named_dims: usize,
        declared: Option<NcType>,
    ) -> Result<Shape, WriteError> {
        let mut dims = Vec::new();
        let mut cur = Some(values);
        while let Some(Value::Seq(items)) = cur {
            dims.push(items.len() as u64);
            cur = items.first();
        }
        let depth = dims.len();

        let nc_type = match (cur, declared) {
            (Some(leaf), declared) => {
                let found = NcType::of_leaf(leaf).ok_or_else(|| {
                    WriteError::UnsupportedType(format!("{var}: {leaf:?}"))
                })?;
                if declared.is_some_and(|d| d != found) {
                    return Err(WriteError::UnsupportedType(format!(
                        "{var}: declared {declared:?}, values are {found:?}"
                    )));
                }
                found
            }
            (None, Some(declared)) => declared,
            (None, None) => return Err(WriteError::EmptySlice(var.to_string())),
        };

        let mut string_len = None;
        if nc_type == NcType::Char {
            match cur {
                Some(Value::Str(s)) if depth == 0 => {
                    // one character with no dimension names is a scalar
                    if !(s.len() == 1 && named_dims == 0) {
                        dims.push(s.len() as u64);
                        string_len = Some(s.len() as u64);
                    }
                }
                _ => {
                    let max = values
                        .flatten()
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(str::len)
                        .max()
                        .unwrap_or(0) as u64;
                    if max == 0 {
                        return Err(WriteError::EmptySlice(var.to_string()));
                    }
                    dims.push(max);
                    string_len = Some(max);
                }
            }
        }

        if let Some(pos) = dims.iter().skip(1).position(|&d| d == 0) {
            tracing::debug!(variable = var, dimension = pos + 1, "zero-length inner dimension");
            return Err(WriteError::UnlimitedMustBeFirst(var.to_string()));
        }
        check_tree(var, values, &dims[..depth], nc_type)?;

        Ok(Shape {
            nc_type,
            dims,
            string_len,
        })
    }

    /// Whether the first dimension is the unlimited one.
    pub fn is_record(&self) -> bool {
        self.dims.first() == Some(&0)
    }

    /// Bytes of one record (or of the whole variable when it has no
    /// unlimited dimension), padded to 4.
    pub fn vsize(&self) -> u64 {
        let raw = self
            .dims
            .iter()
            .filter(|&&d| d != 0)
            .product::<u64>()
            * self.nc_type.size();
        pad4(raw)
    }
}

/// Every `Seq` at depth `i` has `dims[i]` items; leaves share one type.
fn check_tree(var: &str, value: &Value, dims: &[u64], nc_type: NcType) -> Result<(), WriteError> {
    match (value, dims.split_first()) {
        (Value::Seq(items), Some((&n, rest))) => {
            if items.len() as u64 != n {
                return Err(WriteError::DimensionSize(format!(
                    "{var}: {} items where {n} expected",
                    items.len()
                )));
            }
            items.iter().try_for_each(|v| check_tree(var, v, rest, nc_type))
        }
        (Value::Seq(_), None) | (_, Some(_)) => Err(WriteError::DimensionSize(format!(
            "{var}: ragged nesting"
        ))),
        (leaf, None) => {
            if NcType::of_leaf(leaf) == Some(nc_type) {
                Ok(())
            } else {
                Err(WriteError::UnsupportedType(format!(
                    "{var}: {leaf:?} among {nc_type:?} values"
                )))
            }
        }
    }
}

/// Write the leaves of `value` in row-major order, then pad to 4.
pub(crate) fn write_values<W: Write>(w: &mut W, value: &Value, shape: &Shape) -> io::Result<u64> {
    let mut written = 0u64;
    for leaf in value.flatten() {
        write_leaf(w, leaf)?;
        let mut n = shape.nc_type.size();
        if let (Value::Str(s), Some(len)) = (leaf, shape.string_len) {
            let zeros = len.saturating_sub(s.len() as u64);
            w.write_all(&vec![0u8; zeros as usize])?;
            n = s.len() as u64 + zeros;
        } else if let Value::Str(s) = leaf {
            n = s.len() as u64;
        }
        written += n;
    }
    let padding = pad4(written) - written;
    w.write_all(&[0u8; 3][..padding as usize])?;
    Ok(written + padding)
}

pub(crate) fn pad4(n: u64) -> u64 {
    (n + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(v: &[i16]) -> Value {
        Value::Seq(v.iter().map(|&x| Value::Int16(x)).collect())
    }

    #[test]
    fn numeric_grid() {
        let v = Value::Seq(vec![ints(&[1, 2, 3]), ints(&[4, 5, 6])]);
        let shape = Shape::infer("v", &v, 0, None).unwrap();
        assert_eq!(shape.dims, vec![2, 3]);
        assert_eq!(shape.nc_type, NcType::Short);
        assert_eq!(shape.vsize(), 12);

        let mut out = Vec::new();
        assert_eq!(write_values(&mut out, &ints(&[1, 2, 3]), &Shape::infer("v", &ints(&[1, 2, 3]), 0, None).unwrap()).unwrap(), 8);
        assert_eq!(out, [0, 1, 0, 2, 0, 3, 0, 0]);
    }

    #[test]
    fn strings_get_a_length_dimension() {
        let v = Value::Seq(vec![Value::Str("ab".into()), Value::Str("xyz".into())]);
        let shape = Shape::infer("names", &v, 0, None).unwrap();
        assert_eq!(shape.dims, vec![2, 3]);
        assert_eq!(shape.string_len, Some(3));
        let mut out = Vec::new();
        write_values(&mut out, &v, &shape).unwrap();
        assert_eq!(out, b"ab\0xyz\0\0");

        let single = Shape::infer("c", &Value::Str("q".into()), 0, None).unwrap();
        assert!(single.dims.is_empty());
        let word = Shape::infer("w", &Value::Str("hello".into()), 0, None).unwrap();
        assert_eq!(word.dims, vec![5]);
    }

    #[test]
    fn empty_values() {
        let empty = Value::Seq(vec![]);
        assert!(matches!(Shape::infer("e", &empty, 0, None), Err(WriteError::EmptySlice(_))));
        let shape = Shape::infer("e", &empty, 0, Some(NcType::Int)).unwrap();
        assert!(shape.is_record());
        assert_eq!(shape.vsize(), 4);

        let inner = Value::Seq(vec![Value::Seq(vec![])]);
        assert!(matches!(
            Shape::infer("i", &inner, 0, Some(NcType::Int)),
            Err(WriteError::UnlimitedMustBeFirst(_))
        ));
        let blank = Value::Seq(vec![Value::Str(String::new())]);
        assert!(matches!(Shape::infer("b", &blank, 0, None), Err(WriteError::EmptySlice(_))));
    }

    #[test]
    fn ragged_and_mixed() {
        let ragged = Value::Seq(vec![ints(&[1, 2]), ints(&[3])]);
        assert!(matches!(Shape::infer("r", &ragged, 0, None), Err(WriteError::DimensionSize(_))));
        let mixed = Value::Seq(vec![Value::Int16(1), Value::Int32(2)]);
        assert!(matches!(Shape::infer("m", &mixed, 0, None), Err(WriteError::UnsupportedType(_))));
        let refs = Value::Seq(vec![Value::Reference(1)]);
        assert!(matches!(Shape::infer("x", &refs, 0, None), Err(WriteError::UnsupportedType(_))));
    }
}
