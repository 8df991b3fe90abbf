//! Error type of the classic writer.

use std::fmt;

/// Errors returned while building or writing a classic file.
#[derive(Debug)]
pub enum WriteError {
    /// Not a legal netCDF name.
    InvalidName(String),
    /// A dimension is reused with a different length, or the values are
    /// ragged.
    DimensionSize(String),
    /// A zero-length (unlimited) dimension that is not the first.
    UnlimitedMustBeFirst(String),
    /// No element type can be inferred from an empty value.
    EmptySlice(String),
    /// An attribute value with no classic representation.
    Attribute(String),
    /// Variable values with no classic representation.
    UnsupportedType(String),
    /// I/O failure on the output.
    Io(std::io::Error),
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::InvalidName(name) => write!(f, "invalid name: {name:?}"),
            WriteError::DimensionSize(msg) => write!(f, "dimension size mismatch: {msg}"),
            WriteError::UnlimitedMustBeFirst(var) => {
                write!(f, "unlimited dimension must be first in {var}")
            }
            WriteError::EmptySlice(var) => write!(f, "empty slice in {var}"),
            WriteError::Attribute(msg) => write!(f, "invalid attribute: {msg}"),
            WriteError::UnsupportedType(msg) => write!(f, "unsupported type: {msg}"),
            WriteError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriteError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WriteError {
    fn from(e: std::io::Error) -> Self {
        WriteError::Io(e)
    }
}
