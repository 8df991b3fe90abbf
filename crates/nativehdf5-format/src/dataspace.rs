//! Dataspace message parsing (message type 0x0001).

use crate::bytes::{checked_product, ensure_len, read_u64, LENGTH_SIZE};
use crate::error::FormatError;

/// Type of dataspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataspaceType {
    /// Scalar (single element).
    Scalar,
    /// Simple (N-dimensional array).
    Simple,
    /// Null (no data).
    Null,
}

/// Parsed dataspace message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    /// The type of this dataspace.
    pub space_type: DataspaceType,
    /// Current dimension sizes, outermost first.
    pub dimensions: Vec<u64>,
    /// Maximum dimension sizes, if present. `u64::MAX` means unlimited.
    pub max_dimensions: Option<Vec<u64>>,
}

impl Dataspace {
    /// A scalar dataspace.
    pub fn scalar() -> Dataspace {
        Dataspace {
            space_type: DataspaceType::Scalar,
            dimensions: Vec::new(),
            max_dimensions: None,
        }
    }

    /// A simple dataspace with the given extents.
    pub fn simple(dimensions: Vec<u64>) -> Dataspace {
        Dataspace {
            space_type: DataspaceType::Simple,
            dimensions,
            max_dimensions: None,
        }
    }

    /// Parse a dataspace message from raw message bytes.
    pub fn parse(data: &[u8]) -> Result<Dataspace, FormatError> {
        ensure_len(data, 0, 4)?;

        let version = data[0];
        let rank = data[1] as usize;
        let flags = data[2];

        let (space_type, mut pos) = match version {
            1 => {
                // byte 3 reserved, then 4 more reserved bytes
                ensure_len(data, 0, 8)?;
                let st = if rank == 0 {
                    DataspaceType::Scalar
                } else {
                    DataspaceType::Simple
                };
                (st, 8usize)
            }
            2 => {
                let st = match data[3] {
                    0 => DataspaceType::Scalar,
                    1 => DataspaceType::Simple,
                    2 => DataspaceType::Null,
                    t => {
                        return Err(FormatError::corrupted(format!("dataspace type {t}")));
                    }
                };
                (st, 4usize)
            }
            v => {
                return Err(FormatError::UnsupportedVersion {
                    structure: "dataspace",
                    version: v,
                })
            }
        };

        let mut dimensions = Vec::with_capacity(rank);
        for _ in 0..rank {
            dimensions.push(read_u64(data, pos)?);
            pos += LENGTH_SIZE;
        }

        let max_dimensions = if flags & 0x01 != 0 {
            let mut max_dims = Vec::with_capacity(rank);
            for _ in 0..rank {
                max_dims.push(read_u64(data, pos)?);
                pos += LENGTH_SIZE;
            }
            Some(max_dims)
        } else {
            None
        };

        // v1 permutation indices are never written by the library; skip them.
        if version == 1 && flags & 0x02 != 0 {
            ensure_len(data, pos, rank * LENGTH_SIZE)?;
        }

        Ok(Dataspace {
            space_type,
            dimensions,
            max_dimensions,
        })
    }

    /// Total number of elements. Extents whose product overflows are
    /// `Corrupted`.
    pub fn num_elements(&self) -> Result<u64, FormatError> {
        match self.space_type {
            DataspaceType::Scalar => Ok(1),
            DataspaceType::Null => Ok(0),
            DataspaceType::Simple => checked_product(self.dimensions.iter().copied(), "dataspace"),
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_bytes(dims: &[u64], max: Option<&[u64]>) -> Vec<u8> {
        let mut buf = vec![1, dims.len() as u8, u8::from(max.is_some()), 0, 0, 0, 0, 0];
        for d in dims {
            buf.extend_from_slice(&d.to_le_bytes());
        }
        if let Some(max) = max {
            for d in max {
                buf.extend_from_slice(&d.to_le_bytes());
            }
        }
        buf
    }

    #[test]
    fn v1_simple_with_max() {
        let data = v1_bytes(&[10, 20], Some(&[u64::MAX, 20]));
        let ds = Dataspace::parse(&data).unwrap();
        assert_eq!(ds.space_type, DataspaceType::Simple);
        assert_eq!(ds.dimensions, vec![10, 20]);
        assert_eq!(ds.max_dimensions, Some(vec![u64::MAX, 20]));
        assert_eq!(ds.num_elements().unwrap(), 200);
    }

    #[test]
    fn v1_rank_zero_is_scalar() {
        let ds = Dataspace::parse(&v1_bytes(&[], None)).unwrap();
        assert_eq!(ds.space_type, DataspaceType::Scalar);
        assert_eq!(ds.num_elements().unwrap(), 1);
    }

    #[test]
    fn v2_null() {
        let ds = Dataspace::parse(&[2, 0, 0, 2]).unwrap();
        assert_eq!(ds.space_type, DataspaceType::Null);
        assert_eq!(ds.num_elements().unwrap(), 0);
    }

    #[test]
    fn v2_zero_length_dimension() {
        let mut data = vec![2, 1, 0, 1];
        data.extend_from_slice(&0u64.to_le_bytes());
        let ds = Dataspace::parse(&data).unwrap();
        assert_eq!(ds.num_elements().unwrap(), 0);
    }

    #[test]
    fn overflowing_extents_rejected() {
        let mut data = vec![2, 3, 0, 1];
        for _ in 0..3 {
            data.extend_from_slice(&(1u64 << 32).to_le_bytes());
        }
        let ds = Dataspace::parse(&data).unwrap();
        let err = ds.num_elements().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Corrupted);
    }

    #[test]
    fn unsupported_version() {
        let err = Dataspace::parse(&[3, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(
            err,
            FormatError::UnsupportedVersion {
                structure: "dataspace",
                version: 3
            }
        );
    }

    #[test]
    fn truncated_dims() {
        let data = [2u8, 2, 0, 1, 1, 0, 0, 0];
        assert!(matches!(
            Dataspace::parse(&data),
            Err(FormatError::UnexpectedEof { .. })
        ));
    }
}
