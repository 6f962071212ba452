use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::TransferError;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Chunk sources
// ---------------------------------------------------------------------------

/// Read-only byte source the sender serves chunks from.
///
/// Reads never mutate the source, so every connection in a room may read
/// from the same source without coordination.
pub trait ChunkSource: Send + Sync {
    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Fills `buf` with the bytes starting at `offset`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), TransferError>;
}

/// Reads `[offset, min(offset + chunk_size, size))` from `source`.
pub fn read_chunk(
    source: &dyn ChunkSource,
    offset: u64,
    chunk_size: usize,
) -> Result<Vec<u8>, TransferError> {
    let size = source.size();
    if offset >= size {
        return Err(TransferError::OffsetOutOfRange { offset, size });
    }
    let len = (size - offset).min(chunk_size as u64) as usize;
    let mut buf = vec![0u8; len];
    source.read_exact_at(offset, &mut buf)?;
    Ok(buf)
}

/// A file on disk, read with positioned reads (no shared cursor).
pub struct FileSource {
    file: std::fs::File,
    size: u64,
    path: PathBuf,
}

impl FileSource {
    /// Opens `path` for chunked reading.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(TransferError::InvalidPath(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        Ok(Self {
            file,
            size: meta.len(),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChunkSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    #[cfg(unix)]
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), TransferError> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    #[cfg(windows)]
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), TransferError> {
        use std::os::windows::fs::FileExt;
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .file
                .seek_read(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            filled += n;
        }
        Ok(())
    }
}

/// Bytes held in memory. Cheap to clone.
#[derive(Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl ChunkSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), TransferError> {
        let start = usize::try_from(offset).map_err(|_| TransferError::OffsetOutOfRange {
            offset,
            size: self.size(),
        })?;
        let end = start
            .checked_add(buf.len())
            .filter(|end| *end <= self.data.len())
            .ok_or(TransferError::OffsetOutOfRange {
                offset,
                size: self.size(),
            })?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn checksum_bytes_deterministic() {
        let c1 = checksum_bytes(b"hello world");
        let c2 = checksum_bytes(b"hello world");
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), 64); // SHA-256 = 64 hex chars.
    }

    #[test]
    fn calculate_file_checksum_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let data = b"test content for checksum";
        let path = create_test_file(dir.path(), "test.bin", data);

        let file_cs = calculate_file_checksum(&path).unwrap();
        assert_eq!(file_cs, checksum_bytes(data));
    }

    #[test]
    fn file_source_reads_chunks() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");
        let source = FileSource::open(&path).unwrap();
        assert_eq!(source.size(), 10);
        assert_eq!(source.path(), path.as_path());

        assert_eq!(read_chunk(&source, 0, 4).unwrap(), b"AABB");
        assert_eq!(read_chunk(&source, 4, 4).unwrap(), b"CCDD");
        assert_eq!(read_chunk(&source, 8, 4).unwrap(), b"EE");
        assert!(matches!(
            read_chunk(&source, 10, 4),
            Err(TransferError::OffsetOutOfRange { offset: 10, size: 10 })
        ));
    }

    #[test]
    fn file_source_random_access() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");
        let source = FileSource::open(&path).unwrap();
        // Out-of-order reads see the same bytes: no shared cursor.
        assert_eq!(read_chunk(&source, 6, 4).unwrap(), b"6789");
        assert_eq!(read_chunk(&source, 0, 3).unwrap(), b"012");
        assert_eq!(read_chunk(&source, 6, 4).unwrap(), b"6789");
    }

    #[test]
    fn file_source_rejects_directory() {
        let dir = TempDir::new().unwrap();
        assert!(FileSource::open(dir.path()).is_err());
    }

    #[test]
    fn memory_source_reads_chunks() {
        let source = MemorySource::from(b"The quick brown fox".to_vec());
        assert_eq!(read_chunk(&source, 4, 5).unwrap(), b"quick");
        assert_eq!(read_chunk(&source, 16, 5).unwrap(), b"fox");
    }

    #[test]
    fn empty_source_has_no_chunks() {
        let source = MemorySource::from(Vec::new());
        assert!(read_chunk(&source, 0, 16).is_err());
    }

    #[test]
    fn concurrent_reads() {
        use std::thread;

        let data: Vec<u8> = (0..64 * 1024u32).map(|i| (i % 251) as u8).collect();
        let source = Arc::new(MemorySource::from(data.clone()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let s = Arc::clone(&source);
                let expected = data.clone();
                thread::spawn(move || {
                    for i in 0..16u64 {
                        let offset = ((t * 16 + i) % 64) * 1024;
                        let chunk = read_chunk(s.as_ref(), offset, 1024).unwrap();
                        let start = offset as usize;
                        assert_eq!(chunk, &expected[start..start + 1024]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
