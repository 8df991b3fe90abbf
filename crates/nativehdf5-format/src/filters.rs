//! Chunk decoding through deflate, shuffle and fletcher32.
//!
//! Stages always run in the same order: the fletcher32 trailer is checked
//! and stripped, the deflate stream is inflated, then bytes are unshuffled.
//! Bit `i` of a chunk's filter mask skips pipeline entry `i`.

use std::io::Read;

use crate::checksum::fletcher32_verify;
use crate::error::FormatError;
use crate::filter_pipeline::{FilterPipeline, FILTER_DEFLATE, FILTER_FLETCHER32, FILTER_SHUFFLE};

fn enabled(pipeline: &FilterPipeline, filter_id: u16, mask: u32) -> Option<usize> {
    pipeline
        .position(filter_id)
        .filter(|&i| i >= 32 || mask & (1 << i) == 0)
}

/// Undo the pipeline on one stored chunk.
pub fn decode_chunk(
    raw: &[u8],
    pipeline: &FilterPipeline,
    filter_mask: u32,
    element_size: usize,
) -> Result<Vec<u8>, FormatError> {
    let mut data = raw.to_vec();

    if enabled(pipeline, FILTER_FLETCHER32, filter_mask).is_some() {
        data = fletcher32_verify(&data)?.to_vec();
    }
    if enabled(pipeline, FILTER_DEFLATE, filter_mask).is_some() {
        data = inflate(&data)?;
    }
    if let Some(i) = enabled(pipeline, FILTER_SHUFFLE, filter_mask) {
        let size = pipeline.filters[i]
            .client_data
            .first()
            .map(|&v| v as usize)
            .unwrap_or(element_size);
        data = unshuffle(&data, size);
    }
    Ok(data)
}

/// Inflate a zlib stream.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| FormatError::Decompression(e.to_string()))?;
    Ok(out)
}

/// Reverse the byte shuffle. Trailing bytes that do not fill a whole
/// element were never shuffled and are copied as-is.
pub fn unshuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 || data.len() < element_size {
        return data.to_vec();
    }
    let n = data.len() / element_size;
    let mut out = vec![0u8; data.len()];
    for (j, plane) in data[..n * element_size].chunks_exact(n).enumerate() {
        for (i, &b) in plane.iter().enumerate() {
            out[i * element_size + j] = b;
        }
    }
    out[n * element_size..].copy_from_slice(&data[n * element_size..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::fletcher32;
    use crate::error::ErrorKind;
    use crate::filter_pipeline::tests::build_v2;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn shuffle(data: &[u8], size: usize) -> Vec<u8> {
        let n = data.len() / size;
        let mut out = vec![0u8; data.len()];
        for i in 0..n {
            for j in 0..size {
                out[j * n + i] = data[i * size + j];
            }
        }
        out
    }

    fn with_fletcher(data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        out.extend_from_slice(&fletcher32(data).to_le_bytes());
        out
    }

    #[test]
    fn unshuffle_known_pattern() {
        let shuffled = [1, 3, 5, 2, 4, 6];
        assert_eq!(unshuffle(&shuffled, 2), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn unshuffle_keeps_leftover_bytes() {
        let mut shuffled = shuffle(&[1, 2, 3, 4], 2);
        shuffled.push(9);
        assert_eq!(unshuffle(&shuffled, 2), vec![1, 2, 3, 4, 9]);
    }

    #[test]
    fn full_pipeline() {
        let values: Vec<u8> = (1..=6i32).flat_map(|v| v.to_le_bytes()).collect();
        let stored = with_fletcher(&deflate(&shuffle(&values, 4)));
        let pipeline = FilterPipeline::parse(&build_v2(&[
            (FILTER_SHUFFLE, &[4]),
            (FILTER_DEFLATE, &[6]),
            (FILTER_FLETCHER32, &[]),
        ]))
        .unwrap();
        assert_eq!(decode_chunk(&stored, &pipeline, 0, 4).unwrap(), values);
    }

    #[test]
    fn mask_skips_filters() {
        let values = vec![7u8; 32];
        let pipeline = FilterPipeline::parse(&build_v2(&[(FILTER_DEFLATE, &[])])).unwrap();
        assert_eq!(decode_chunk(&values, &pipeline, 0b1, 1).unwrap(), values);
    }

    #[test]
    fn fletcher_mismatch() {
        let mut stored = with_fletcher(&[1, 2, 3, 4, 5, 6, 7, 8]);
        stored[3] ^= 0x10;
        let pipeline = FilterPipeline::parse(&build_v2(&[(FILTER_FLETCHER32, &[])])).unwrap();
        let err = decode_chunk(&stored, &pipeline, 0, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FletcherChecksumMismatch);
    }

    #[test]
    fn broken_deflate_stream() {
        let err = inflate(&[0x78, 0x9c, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, FormatError::Decompression(_)));
    }
}
