//! Global heap collections ("GCOL"), the store behind variable-length data.

use crate::bytes::{expect_signature, pad8, read_u16, read_u64, read_u8, slice, to_usize};
use crate::error::FormatError;

/// One object of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalHeapObject {
    /// 1-based; index 0 marks free space.
    pub index: u16,
    pub reference_count: u16,
    pub data: Vec<u8>,
}

/// A parsed global heap collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalHeapCollection {
    pub address: u64,
    pub collection_size: u64,
    pub objects: Vec<GlobalHeapObject>,
}

impl GlobalHeapCollection {
    pub fn parse(file: &[u8], address: u64) -> Result<GlobalHeapCollection, FormatError> {
        let base = to_usize(address)?;
        expect_signature(file, base, b"GCOL")?;
        let version = read_u8(file, base + 4)?;
        if version != 1 {
            return Err(FormatError::UnsupportedVersion {
                structure: "global heap",
                version,
            });
        }
        let collection_size = read_u64(file, base + 8)?;
        let region = slice(file, base, to_usize(collection_size)?)?;

        // index(2) + refcount(2) + reserved(4) + size(8)
        let mut pos = 16;
        let mut objects = Vec::new();
        while pos + 16 <= region.len() {
            let index = read_u16(region, pos)?;
            if index == 0 {
                break;
            }
            let reference_count = read_u16(region, pos + 2)?;
            let size = to_usize(read_u64(region, pos + 8)?)?;
            pos += 16;
            let data = slice(region, pos, size)
                .map_err(|_| {
                    FormatError::corrupted(format!(
                        "global heap object {index} overruns its collection at {address:#x}"
                    ))
                })?
                .to_vec();
            pos += pad8(size);
            objects.push(GlobalHeapObject {
                index,
                reference_count,
                data,
            });
        }
        tracing::trace!(address, objects = objects.len(), "parsed global heap collection");

        Ok(GlobalHeapCollection {
            address,
            collection_size,
            objects,
        })
    }

    /// The data of object `index`.
    pub fn object(&self, index: u32) -> Result<&[u8], FormatError> {
        self.objects
            .iter()
            .find(|o| o.index as u32 == index)
            .map(|o| o.data.as_slice())
            .ok_or_else(|| {
                FormatError::corrupted(format!(
                    "global heap object {index} missing from collection at {:#x}",
                    self.address
                ))
            })
    }
}
