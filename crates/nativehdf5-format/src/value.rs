//! The decoded value tree.

/// A decoded value: a scalar leaf, or a nesting of sequences and records.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Str(String),
    Opaque(Vec<u8>),
    /// Address of the referenced object header.
    Reference(u64),
    /// Members in declaration order.
    Compound(Vec<(String, Value)>),
    /// One variable-length element.
    VarLen(Vec<Value>),
    /// One dimension of an array, dataspace or array datatype.
    Seq(Vec<Value>),
}

impl Value {
    /// Number of leaves once every `Seq` level is flattened. `VarLen` and
    /// `Compound` count as one leaf.
    pub fn flat_len(&self) -> usize {
        match self {
            Value::Seq(items) => items.iter().map(Value::flat_len).sum(),
            _ => 1,
        }
    }

    /// Extents of the leading `Seq` nesting, outermost first. Ragged
    /// nestings report the extents of their first element.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::new();
        let mut cur = self;
        while let Value::Seq(items) = cur {
            shape.push(items.len());
            match items.first() {
                Some(first) => cur = first,
                None => break,
            }
        }
        shape
    }

    /// Leaves in row-major order.
    pub fn flatten(&self) -> Vec<&Value> {
        let mut out = Vec::with_capacity(self.flat_len());
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a Value>) {
        match self {
            Value::Seq(items) => items.iter().for_each(|v| v.flatten_into(out)),
            leaf => out.push(leaf),
        }
    }

    /// Any integer leaf widened to `i64`. `UInt64` values above `i64::MAX`
    /// do not fit and yield `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v as i64),
            Value::Int16(v) => Some(v as i64),
            Value::Int32(v) => Some(v as i64),
            Value::Int64(v) => Some(v),
            Value::UInt8(v) => Some(v as i64),
            Value::UInt16(v) => Some(v as i64),
            Value::UInt32(v) => Some(v as i64),
            Value::UInt64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt8(v) => Some(v as u64),
            Value::UInt16(v) => Some(v as u64),
            Value::UInt32(v) => Some(v as u64),
            Value::UInt64(v) => Some(v),
            _ => self.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    /// Any numeric leaf as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float32(v) => Some(v as f64),
            Value::Float64(v) => Some(v),
            Value::UInt64(v) => Some(v as f64),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<u64> {
        match *self {
            Value::Reference(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) | Value::VarLen(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a compound member by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Compound(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}
