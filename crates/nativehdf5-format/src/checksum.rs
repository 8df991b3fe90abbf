//! Checksums used by the container: Jenkins lookup3 for metadata and
//! fletcher32 for filtered chunks.

use byteorder::{ByteOrder, LittleEndian};

use crate::bytes::ensure_len;
use crate::error::FormatError;

/// Compute the Jenkins lookup3 `hashlittle` checksum with an initial value of 0.
///
/// Every checksummed metadata structure (superblock v2, object header v2,
/// "OCHK", B-tree v2 nodes, fractal heap blocks) stores this value
/// little-endian directly after the bytes it covers.
pub fn jenkins_lookup3(data: &[u8]) -> u32 {
    let init = 0xdead_beefu32.wrapping_add(data.len() as u32);
    let (mut a, mut b, mut c) = (init, init, init);

    let mut rest = data;
    while rest.len() > 12 {
        a = a.wrapping_add(LittleEndian::read_u32(&rest[0..4]));
        b = b.wrapping_add(LittleEndian::read_u32(&rest[4..8]));
        c = c.wrapping_add(LittleEndian::read_u32(&rest[8..12]));
        mix(&mut a, &mut b, &mut c);
        rest = &rest[12..];
    }

    if rest.is_empty() {
        return c;
    }

    // The byte-wise tail additions of hashlittle are equivalent to reading
    // the tail zero-padded to a full block.
    let mut tail = [0u8; 12];
    tail[..rest.len()].copy_from_slice(rest);
    a = a.wrapping_add(LittleEndian::read_u32(&tail[0..4]));
    b = b.wrapping_add(LittleEndian::read_u32(&tail[4..8]));
    c = c.wrapping_add(LittleEndian::read_u32(&tail[8..12]));
    final_mix(&mut a, &mut b, &mut c);
    c
}

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    for (shift_ac, shift_ba, shift_cb) in [(4, 6, 8), (16, 19, 4)] {
        *a = a.wrapping_sub(*c);
        *a ^= c.rotate_left(shift_ac);
        *c = c.wrapping_add(*b);
        *b = b.wrapping_sub(*a);
        *b ^= a.rotate_left(shift_ba);
        *a = a.wrapping_add(*c);
        *c = c.wrapping_sub(*b);
        *c ^= b.rotate_left(shift_cb);
        *b = b.wrapping_add(*a);
    }
}

fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

/// Verify the lookup3 checksum of `data[start..start + covered]` against the
/// little-endian value stored immediately after it.
pub fn verify_checksum(data: &[u8], start: usize, covered: usize) -> Result<(), FormatError> {
    ensure_len(data, start, covered + 4)?;
    let end = start + covered;
    let expected = LittleEndian::read_u32(&data[end..end + 4]);
    let computed = jenkins_lookup3(&data[start..end]);
    if expected != computed {
        return Err(FormatError::ChecksumMismatch { expected, computed });
    }
    Ok(())
}

/// HDF5 fletcher32 over big-endian 16-bit words.
///
/// An odd trailing byte is treated as the high byte of a final word.
pub fn fletcher32(data: &[u8]) -> u32 {
    const BLOCK_WORDS: usize = 360;

    let fold = |s: u64| (s & 0xffff) + (s >> 16);
    let mut sum1: u64 = 0;
    let mut sum2: u64 = 0;

    let words = data.chunks_exact(2);
    let odd = words.remainder().first().copied();
    let words: Vec<&[u8]> = words.collect();
    for block in words.chunks(BLOCK_WORDS) {
        for w in block {
            sum1 += (u64::from(w[0]) << 8) | u64::from(w[1]);
            sum2 += sum1;
        }
        sum1 = fold(sum1);
        sum2 = fold(sum2);
    }

    if let Some(last) = odd {
        sum1 += u64::from(last) << 8;
        sum2 += sum1;
        sum1 = fold(sum1);
        sum2 = fold(sum2);
    }

    sum1 = fold(sum1);
    sum2 = fold(sum2);
    ((sum2 as u32) << 16) | (sum1 as u32 & 0xffff)
}

/// Verify the 4-byte fletcher32 trailer of a chunk and return the payload.
///
/// Files written by some old library releases store the checksum byte-swapped;
/// both orders are accepted.
pub fn fletcher32_verify(chunk: &[u8]) -> Result<&[u8], FormatError> {
    if chunk.len() < 4 {
        return Err(FormatError::corrupted(
            "fletcher32 chunk shorter than its checksum",
        ));
    }
    let (payload, trailer) = chunk.split_at(chunk.len() - 4);
    let expected = LittleEndian::read_u32(trailer);
    let computed = fletcher32(payload);
    if expected != computed && expected != computed.swap_bytes() {
        return Err(FormatError::FletcherMismatch { expected, computed });
    }
    Ok(payload)
}
