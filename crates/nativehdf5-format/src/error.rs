//! Error types for HDF5 format parsing.

use core::fmt;

/// Broad classification of a [`FormatError`].
///
/// Callers that only need to distinguish "bad file" from "file uses a
/// feature we do not read" match on this rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A signature or magic number did not match.
    BadMagic,
    /// A structure version outside the supported set.
    UnsupportedVersion,
    /// The file is shorter than its declared end-of-file address.
    Truncated,
    /// A structural invariant was violated.
    Corrupted,
    /// A metadata checksum did not match.
    ChecksumMismatch,
    /// A per-chunk fletcher32 checksum did not match.
    FletcherChecksumMismatch,
    /// A valid construct this reader deliberately rejects.
    UnsupportedFeature,
    /// A named group, variable, or heap object does not exist.
    NotFound,
    /// A name that is not a legal netCDF name.
    InvalidName,
    /// An I/O failure below the parser.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::BadMagic => "bad magic",
            ErrorKind::UnsupportedVersion => "unsupported version",
            ErrorKind::Truncated => "truncated",
            ErrorKind::Corrupted => "corrupted",
            ErrorKind::ChecksumMismatch => "checksum mismatch",
            ErrorKind::FletcherChecksumMismatch => "fletcher32 checksum mismatch",
            ErrorKind::UnsupportedFeature => "unsupported feature",
            ErrorKind::NotFound => "not found",
            ErrorKind::InvalidName => "invalid name",
            ErrorKind::Io => "i/o error",
        };
        f.write_str(s)
    }
}

/// Errors that can occur when parsing HDF5 binary format structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The HDF5 magic signature was not found at offset 0.
    SignatureNotFound,
    /// A structure signature ("OHDR", "TREE", "FRHP", ...) did not match.
    InvalidSignature {
        /// The signature that was expected.
        expected: &'static str,
        /// File address that was checked.
        address: u64,
    },
    /// A structure version is not supported.
    UnsupportedVersion {
        /// Name of the structure.
        structure: &'static str,
        /// The version found.
        version: u8,
    },
    /// The file is shorter than the superblock end-of-file address.
    Truncated {
        /// End-of-file address recorded in the superblock.
        eof_address: u64,
        /// Actual length of the file.
        file_size: u64,
    },
    /// Unexpected end of data.
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// A structural invariant was violated.
    Corrupted(String),
    /// Jenkins lookup3 metadata checksum mismatch.
    ChecksumMismatch {
        /// The checksum stored in the file.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    /// Fletcher32 chunk checksum mismatch.
    FletcherMismatch {
        /// The checksum stored after the chunk.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    /// Invalid offset size (only 8 is accepted).
    InvalidOffsetSize(u8),
    /// Invalid length size (only 8 is accepted).
    InvalidLengthSize(u8),
    /// Unknown message type that is marked as must-understand.
    UnsupportedMessage(u16),
    /// A filter id other than deflate, shuffle, or fletcher32.
    UnsupportedFilter(u16),
    /// Any other construct that is recognised but not read.
    UnsupportedFeature(String),
    /// Deflate stream could not be decoded.
    Decompression(String),
    /// A heap object or path component does not exist.
    NotFound(String),
}

impl FormatError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormatError::SignatureNotFound | FormatError::InvalidSignature { .. } => {
                ErrorKind::BadMagic
            }
            FormatError::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            FormatError::Truncated { .. } => ErrorKind::Truncated,
            FormatError::UnexpectedEof { .. }
            | FormatError::Corrupted(_)
            | FormatError::Decompression(_) => ErrorKind::Corrupted,
            FormatError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            FormatError::FletcherMismatch { .. } => ErrorKind::FletcherChecksumMismatch,
            FormatError::InvalidOffsetSize(_)
            | FormatError::InvalidLengthSize(_)
            | FormatError::UnsupportedMessage(_)
            | FormatError::UnsupportedFilter(_)
            | FormatError::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            FormatError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    pub(crate) fn corrupted(msg: impl Into<String>) -> FormatError {
        FormatError::Corrupted(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> FormatError {
        FormatError::UnsupportedFeature(msg.into())
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::SignatureNotFound => {
                write!(f, "HDF5 signature not found at offset 0")
            }
            FormatError::InvalidSignature { expected, address } => {
                write!(f, "expected {expected} signature at address {address:#x}")
            }
            FormatError::UnsupportedVersion { structure, version } => {
                write!(f, "unsupported {structure} version: {version}")
            }
            FormatError::Truncated {
                eof_address,
                file_size,
            } => {
                write!(
                    f,
                    "file truncated: end-of-file address {eof_address:#x} beyond file size {file_size:#x}"
                )
            }
            FormatError::UnexpectedEof {
                expected,
                available,
            } => {
                write!(f, "unexpected EOF: need {expected} bytes, have {available}")
            }
            FormatError::Corrupted(msg) => write!(f, "corrupted file: {msg}"),
            FormatError::ChecksumMismatch { expected, computed } => {
                write!(
                    f,
                    "checksum mismatch: expected {expected:#010x}, computed {computed:#010x}"
                )
            }
            FormatError::FletcherMismatch { expected, computed } => {
                write!(
                    f,
                    "fletcher32 mismatch: expected {expected:#010x}, computed {computed:#010x}"
                )
            }
            FormatError::InvalidOffsetSize(s) => {
                write!(f, "invalid offset size: {s} (only 8 is supported)")
            }
            FormatError::InvalidLengthSize(s) => {
                write!(f, "invalid length size: {s} (only 8 is supported)")
            }
            FormatError::UnsupportedMessage(id) => {
                write!(
                    f,
                    "unsupported message type {id:#06x} marked as must-understand"
                )
            }
            FormatError::UnsupportedFilter(id) => write!(f, "unsupported filter id {id}"),
            FormatError::UnsupportedFeature(msg) => write!(f, "unsupported feature: {msg}"),
            FormatError::Decompression(msg) => write!(f, "decompression failed: {msg}"),
            FormatError::NotFound(what) => write!(f, "not found: {what}"),
        }
    }
}

impl std::error::Error for FormatError {}
