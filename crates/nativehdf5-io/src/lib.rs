//! Random-access byte sources for HDF5 containers.
//!
//! A [`ByteSource`] holds the whole file, either read into memory or
//! memory-mapped (feature `mmap`). [`ByteSource::dup`] hands out another
//! handle over the same storage with its own cursor, so a view of a
//! sub-group can read without disturbing its parent.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use nativehdf5_format::FormatError;

#[cfg(feature = "mmap")]
pub mod mmap;

#[cfg(feature = "mmap")]
pub use mmap::MmapReader;

#[derive(Debug)]
enum Storage {
    Owned(Vec<u8>),
    #[cfg(feature = "mmap")]
    Mapped(MmapReader),
}

impl Storage {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(data) => data,
            #[cfg(feature = "mmap")]
            Storage::Mapped(reader) => reader.as_bytes(),
        }
    }
}

/// Shared read-only file contents plus a private cursor.
#[derive(Debug)]
pub struct ByteSource {
    storage: Arc<Storage>,
    pos: u64,
}

impl ByteSource {
    /// Memory-map the file at `path`.
    #[cfg(feature = "mmap")]
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<ByteSource> {
        let reader = MmapReader::open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), len = reader.as_bytes().len(), "mapped file");
        Ok(Self::with_storage(Storage::Mapped(reader)))
    }

    /// Read the whole file at `path` into memory.
    pub fn read<P: AsRef<Path>>(path: P) -> io::Result<ByteSource> {
        let data = fs::read(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), len = data.len(), "read file");
        Ok(Self::from_vec(data))
    }

    pub fn from_vec(data: Vec<u8>) -> ByteSource {
        Self::with_storage(Storage::Owned(data))
    }

    fn with_storage(storage: Storage) -> ByteSource {
        ByteSource {
            storage: Arc::new(storage),
            pos: 0,
        }
    }

    /// Another handle over the same bytes, cursor at the start.
    pub fn dup(&self) -> ByteSource {
        ByteSource {
            storage: Arc::clone(&self.storage),
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole file.
    pub fn as_slice(&self) -> &[u8] {
        self.storage.as_bytes()
    }

    /// A bounded view of `len` bytes at `offset`.
    pub fn slice(&self, offset: u64, len: u64) -> Result<&[u8], FormatError> {
        let data = self.as_slice();
        let out_of_range = || FormatError::UnexpectedEof {
            expected: offset.saturating_add(len).try_into().unwrap_or(usize::MAX),
            available: data.len(),
        };
        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        let len = usize::try_from(len).map_err(|_| out_of_range())?;
        let end = start.checked_add(len).ok_or_else(out_of_range)?;
        data.get(start..end).ok_or_else(out_of_range)
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Number of handles sharing this storage.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.storage)
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.storage.as_bytes();
        let start = usize::try_from(self.pos).unwrap_or(usize::MAX).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ByteSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(off) => (self.len() as u64).checked_add_signed(off),
            SeekFrom::Current(off) => self.pos.checked_add_signed(off),
        };
        match target {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the source",
            )),
        }
    }
}
