//! Read-only memory-mapped storage via `memmap2`.

use memmap2::Mmap;
use std::fs;
use std::io;
use std::path::Path;

/// A read-only mapping of a whole file.
#[derive(Debug)]
pub struct MmapReader {
    _file: fs::File,
    mmap: Mmap,
}

impl MmapReader {
    /// Open a file and map it for reading.
    ///
    /// The file must not be modified by another process while the mapping
    /// is alive.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = fs::File::open(path)?;
        // SAFETY: the mapping is read-only and callers agree not to modify
        // the file while it is mapped.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { _file: file, mmap })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn maps_file_contents() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"\x89HDF\r\n\x1a\n").unwrap();
        tmp.flush().unwrap();
        let reader = MmapReader::open(tmp.path()).unwrap();
        assert_eq!(reader.as_bytes(), b"\x89HDF\r\n\x1a\n");
    }
}
