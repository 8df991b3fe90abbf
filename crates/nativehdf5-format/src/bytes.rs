//! Bounds-checked little-endian field readers shared by the parsers.
//!
//! Only 8-byte offsets and lengths are accepted by the superblock, so every
//! address and length field in the file is read as a `u64`.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// Size in bytes of every file address.
pub const OFFSET_SIZE: usize = 8;

/// Size in bytes of every length field.
pub const LENGTH_SIZE: usize = 8;

/// The all-ones address HDF5 uses for "not allocated".
pub const UNDEFINED_ADDRESS: u64 = u64::MAX;

pub(crate) fn ensure_len(data: &[u8], offset: usize, needed: usize) -> Result<(), FormatError> {
    match offset.checked_add(needed) {
        Some(end) if end <= data.len() => Ok(()),
        _ => Err(FormatError::UnexpectedEof {
            expected: offset.saturating_add(needed),
            available: data.len(),
        }),
    }
}

/// Borrow `len` bytes at `offset`.
pub(crate) fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], FormatError> {
    ensure_len(data, offset, len)?;
    Ok(&data[offset..offset + len])
}

/// Borrow `len` bytes at a file address.
pub(crate) fn slice_at(data: &[u8], address: u64, len: u64) -> Result<&[u8], FormatError> {
    let offset = to_usize(address)?;
    let len = to_usize(len)?;
    slice(data, offset, len)
}

/// Product of `values`; overflow is corruption in the `what` extents.
pub(crate) fn checked_product<I>(values: I, what: &str) -> Result<u64, FormatError>
where
    I: IntoIterator<Item = u64>,
{
    values
        .into_iter()
        .try_fold(1u64, |acc, v| acc.checked_mul(v))
        .ok_or_else(|| FormatError::corrupted(format!("{what} element count overflows")))
}

pub(crate) fn to_usize(v: u64) -> Result<usize, FormatError> {
    usize::try_from(v).map_err(|_| FormatError::UnexpectedEof {
        expected: usize::MAX,
        available: 0,
    })
}

pub(crate) fn read_u8(data: &[u8], pos: usize) -> Result<u8, FormatError> {
    ensure_len(data, pos, 1)?;
    Ok(data[pos])
}

pub(crate) fn read_u16(data: &[u8], pos: usize) -> Result<u16, FormatError> {
    ensure_len(data, pos, 2)?;
    Ok(LittleEndian::read_u16(&data[pos..pos + 2]))
}

pub(crate) fn read_u32(data: &[u8], pos: usize) -> Result<u32, FormatError> {
    ensure_len(data, pos, 4)?;
    Ok(LittleEndian::read_u32(&data[pos..pos + 4]))
}

pub(crate) fn read_u64(data: &[u8], pos: usize) -> Result<u64, FormatError> {
    ensure_len(data, pos, 8)?;
    Ok(LittleEndian::read_u64(&data[pos..pos + 8]))
}

/// Read an unsigned little-endian integer of 1 to 8 bytes.
pub(crate) fn read_uint(data: &[u8], pos: usize, nbytes: usize) -> Result<u64, FormatError> {
    if nbytes == 0 || nbytes > 8 {
        return Err(FormatError::corrupted(format!(
            "variable-width integer of {nbytes} bytes"
        )));
    }
    ensure_len(data, pos, nbytes)?;
    Ok(LittleEndian::read_uint(&data[pos..pos + nbytes], nbytes))
}

/// Read an address field, mapping the undefined address to `None`.
pub(crate) fn read_address(data: &[u8], pos: usize) -> Result<Option<u64>, FormatError> {
    let addr = read_u64(data, pos)?;
    Ok(if addr == UNDEFINED_ADDRESS {
        None
    } else {
        Some(addr)
    })
}

/// Check a 4-byte structure signature at `pos`.
pub(crate) fn expect_signature(
    data: &[u8],
    pos: usize,
    signature: &'static [u8; 4],
) -> Result<(), FormatError> {
    ensure_len(data, pos, 4)?;
    if &data[pos..pos + 4] != signature {
        return Err(FormatError::InvalidSignature {
            expected: core::str::from_utf8(signature).unwrap_or("????"),
            address: pos as u64,
        });
    }
    Ok(())
}

/// Read a NUL-terminated name starting at `pos`.
///
/// Returns the name and the number of bytes consumed including the NUL.
pub(crate) fn read_cstr(data: &[u8], pos: usize) -> Result<(String, usize), FormatError> {
    let remaining = data.get(pos..).ok_or(FormatError::UnexpectedEof {
        expected: pos + 1,
        available: data.len(),
    })?;
    let nul = remaining
        .iter()
        .position(|&b| b == 0)
        .ok_or(FormatError::UnexpectedEof {
            expected: data.len() + 1,
            available: data.len(),
        })?;
    let name = String::from_utf8_lossy(&remaining[..nul]).into_owned();
    Ok((name, nul + 1))
}

/// Round up to the next multiple of 8.
pub(crate) fn pad8(n: usize) -> usize {
    (n + 7) & !7
}

/// Number of bytes needed to hold `bits` bits.
pub(crate) fn bytes_for_bits(bits: u16) -> usize {
    (bits as usize).div_ceil(8)
}
