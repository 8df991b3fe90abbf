//! HDF5 superblock parsing for versions 0, 1 and 2.

use crate::bytes::{ensure_len, read_address, read_u16, read_u32, read_u64, read_u8};
use crate::checksum::verify_checksum;
use crate::error::FormatError;
use crate::symbol_table::{SymbolTableEntry, SYMBOL_TABLE_ENTRY_SIZE};

/// The 8-byte file signature.
pub const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

/// Parsed superblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Superblock version (0, 1 or 2).
    pub version: u8,
    /// Size of offsets in bytes (always 8).
    pub offset_size: u8,
    /// Size of lengths in bytes (always 8).
    pub length_size: u8,
    /// End-of-file address.
    pub eof_address: u64,
    /// Address of the root group's object header.
    pub root_object_header_address: u64,
    /// Root symbol table entry (v0/v1 only).
    pub root_symbol_table_entry: Option<SymbolTableEntry>,
    /// File consistency flags.
    pub consistency_flags: u32,
}

fn validate_sizes(offset_size: u8, length_size: u8) -> Result<(), FormatError> {
    if offset_size != 8 {
        return Err(FormatError::InvalidOffsetSize(offset_size));
    }
    if length_size != 8 {
        return Err(FormatError::InvalidLengthSize(length_size));
    }
    Ok(())
}

fn check_base_address(base_address: u64) -> Result<(), FormatError> {
    if base_address != 0 {
        return Err(FormatError::unsupported(format!(
            "base address {base_address:#x} (only 0 is supported)"
        )));
    }
    Ok(())
}

fn check_eof(eof_address: u64, file_size: u64) -> Result<(), FormatError> {
    if file_size < eof_address {
        return Err(FormatError::Truncated {
            eof_address,
            file_size,
        });
    }
    if file_size > eof_address {
        tracing::warn!(
            eof_address,
            file_size,
            "ignoring bytes beyond the end-of-file address"
        );
    }
    Ok(())
}

impl Superblock {
    /// Parse the superblock at the start of `data`, the whole file.
    pub fn parse(data: &[u8]) -> Result<Superblock, FormatError> {
        ensure_len(data, 0, 9).map_err(|_| FormatError::SignatureNotFound)?;
        if data[..8] != HDF5_SIGNATURE {
            return Err(FormatError::SignatureNotFound);
        }

        let version = data[8];
        let sb = match version {
            0 | 1 => Self::parse_v0v1(data, version)?,
            2 => Self::parse_v2(data)?,
            v => {
                return Err(FormatError::UnsupportedVersion {
                    structure: "superblock",
                    version: v,
                })
            }
        };
        tracing::debug!(
            version = sb.version,
            root = sb.root_object_header_address,
            eof = sb.eof_address,
            "parsed superblock"
        );
        Ok(sb)
    }

    fn parse_v0v1(d: &[u8], version: u8) -> Result<Superblock, FormatError> {
        // sig(8) + version(1) + free_space_ver(1) + root_grp_ver(1) + reserved(1)
        // + shared_hdr_ver(1) + offset_size(1) + length_size(1) + reserved(1)
        // + group_leaf_k(2) + group_internal_k(2) + consistency_flags(4) = 24
        // v1 adds indexed_storage_k(2) + reserved(2).
        ensure_len(d, 0, 24)?;

        if d[10] != 0 || d[12] != 0 {
            tracing::warn!(
                root_group_version = d[10],
                shared_header_version = d[12],
                "unexpected non-zero superblock sub-version"
            );
        }
        validate_sizes(d[13], d[14])?;

        let _group_leaf_k = read_u16(d, 16)?;
        let _group_internal_k = read_u16(d, 18)?;
        let consistency_flags = read_u32(d, 20)?;

        let mut pos = 24;
        if version == 1 {
            let indexed_storage_k = read_u16(d, pos)?;
            if indexed_storage_k == 0 {
                tracing::warn!("indexed storage internal node K is zero");
            }
            pos += 4;
        }

        let base_address = read_u64(d, pos)?;
        check_base_address(base_address)?;
        if read_address(d, pos + 8)?.is_some() {
            tracing::warn!("free-space index address ignored");
        }
        let eof_address = read_u64(d, pos + 16)?;
        check_eof(eof_address, d.len() as u64)?;
        let _driver_info = read_address(d, pos + 24)?;
        pos += 32;

        ensure_len(d, pos, SYMBOL_TABLE_ENTRY_SIZE)?;
        let root = SymbolTableEntry::parse(d, pos)?;
        let root_object_header_address = root
            .object_header_address
            .ok_or_else(|| FormatError::corrupted("root symbol table entry has no header"))?;

        Ok(Superblock {
            version,
            offset_size: 8,
            length_size: 8,
            eof_address,
            root_object_header_address,
            root_symbol_table_entry: Some(root),
            consistency_flags,
        })
    }

    fn parse_v2(d: &[u8]) -> Result<Superblock, FormatError> {
        // sig(8) + version(1) + offset_size(1) + length_size(1) + flags(1)
        // + 4 addresses(32) + checksum(4) = 48
        ensure_len(d, 0, 48)?;
        validate_sizes(d[9], d[10])?;
        verify_checksum(d, 0, 44)?;

        let consistency_flags = read_u8(d, 11)? as u32;
        if consistency_flags != 0 {
            tracing::debug!(consistency_flags, "file consistency flags ignored");
        }

        check_base_address(read_u64(d, 12)?)?;
        if read_address(d, 20)?.is_some() {
            tracing::warn!("superblock extension not supported, continuing");
        }
        let eof_address = read_u64(d, 28)?;
        check_eof(eof_address, d.len() as u64)?;
        let root_object_header_address = read_u64(d, 36)?;

        Ok(Superblock {
            version: 2,
            offset_size: 8,
            length_size: 8,
            eof_address,
            root_object_header_address,
            root_symbol_table_entry: None,
            consistency_flags,
        })
    }
}
