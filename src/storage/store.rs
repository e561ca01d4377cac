//! CPU-side backing stores for evicted bricks

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::core::types::Result;

/// Staging storage holding one brick's level 0 texels while it is evicted
pub trait BackingStore {
    /// Replace the stored contents with `bytes`
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read back the full contents
    fn read(&mut self) -> Result<Vec<u8>>;

    /// Logical size of the stored contents in bytes
    fn size(&self) -> usize;

    /// Bytes actually occupied (differs from `size` when compressed)
    fn stored_bytes(&self) -> usize {
        self.size()
    }
}

/// Anonymous temporary file, deleted by the OS once closed
pub struct TempFileStore {
    file: File,
    len: usize,
}

impl TempFileStore {
    pub fn new() -> Result<Self> {
        Ok(Self { file: tempfile::tempfile()?, len: 0 })
    }
}

impl BackingStore for TempFileStore {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(bytes)?;
        self.file.flush()?;
        self.len = bytes.len();
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut bytes = vec![0u8; self.len];
        self.file.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn size(&self) -> usize {
        self.len
    }
}

/// Plain heap buffer
#[derive(Default)]
pub struct MemoryStore {
    bytes: Vec<u8>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackingStore for MemoryStore {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes.clear();
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }

    fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// LZ4-compressed heap buffer
#[derive(Default)]
pub struct CompressedStore {
    compressed: Vec<u8>,
    len: usize,
}

impl CompressedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackingStore for CompressedStore {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.compressed = lz4_flex::compress_prepend_size(bytes);
        self.len = bytes.len();
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        if self.len == 0 {
            return Ok(Vec::new());
        }
        let bytes = lz4_flex::decompress_size_prepended(&self.compressed).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("LZ4 decompression failed: {}", e))
        })?;
        Ok(bytes)
    }

    fn size(&self) -> usize {
        self.len
    }

    fn stored_bytes(&self) -> usize {
        self.compressed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        (0..4096u32).map(|i| (i / 64) as u8).collect()
    }

    fn check_store(store: &mut dyn BackingStore) {
        assert_eq!(store.size(), 0);
        assert!(store.read().unwrap().is_empty());

        let bytes = sample();
        store.write(&bytes).unwrap();
        assert_eq!(store.size(), bytes.len());
        assert_eq!(store.read().unwrap(), bytes);
        // Reads do not consume
        assert_eq!(store.read().unwrap(), bytes);

        // Shorter rewrite replaces everything
        store.write(&[7, 8, 9]).unwrap();
        assert_eq!(store.size(), 3);
        assert_eq!(store.read().unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn test_temp_file_store() {
        check_store(&mut TempFileStore::new().unwrap());
    }

    #[test]
    fn test_memory_store() {
        check_store(&mut MemoryStore::new());
    }

    #[test]
    fn test_compressed_store() {
        check_store(&mut CompressedStore::new());
    }

    #[test]
    fn test_compressed_store_shrinks_uniform_data() {
        let mut store = CompressedStore::new();
        store.write(&vec![0u8; 64 * 1024]).unwrap();
        assert_eq!(store.size(), 64 * 1024);
        assert!(store.stored_bytes() < 1024);
    }
}
