use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::TransferError;
use crate::integrity::IntegrityHasher;

// ---------------------------------------------------------------------------
// Splitter
// ---------------------------------------------------------------------------

/// Number of chunks needed to cover `source_size` bytes: `ceil(size / chunk)`.
///
/// Returns 0 when either argument is 0. Saturates at `u32::MAX`; uploads that
/// large are rejected by [`crate::validate_upload`].
pub fn total_chunks(source_size: u64, chunk_size: u64) -> u32 {
    if source_size == 0 || chunk_size == 0 {
        return 0;
    }
    u32::try_from(source_size.div_ceil(chunk_size)).unwrap_or(u32::MAX)
}

/// Byte range `[index * chunk_size, min((index + 1) * chunk_size, source_size))`.
pub fn chunk_range(index: u32, source_size: u64, chunk_size: u64) -> Result<Range<u64>, TransferError> {
    let total = total_chunks(source_size, chunk_size);
    if index >= total {
        return Err(TransferError::ChunkOutOfRange { index, total });
    }
    let start = u64::from(index) * chunk_size;
    let end = std::cmp::min(start + chunk_size, source_size);
    Ok(start..end)
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// One chunk of the source, read just before transfer.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position in the chunk sequence, 0-based.
    pub index: u32,
    /// Byte offset of `data` within the source.
    pub offset: u64,
    /// Raw chunk bytes.
    pub data: Vec<u8>,
    /// Hex digest of `data`; `None` when hashing is unavailable.
    pub checksum: Option<String>,
}

impl Chunk {
    /// Byte range covered by this chunk.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.data.len() as u64
    }

    /// Computes the checksum with `hasher`, leaving it `None` if unavailable.
    pub fn with_checksum(mut self, hasher: &IntegrityHasher) -> Self {
        self.checksum = hasher.checksum(&self.data);
        self
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Read-only, randomly addressable upload source.
pub trait ChunkSource: Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Returns `true` if the source holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads exactly the bytes in `range`.
    fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>, TransferError>;
}

/// Reads chunk `index` from `source`, sliced per [`chunk_range`].
pub fn read_chunk(
    source: &dyn ChunkSource,
    index: u32,
    chunk_size: u64,
) -> Result<Chunk, TransferError> {
    let range = chunk_range(index, source.len(), chunk_size)?;
    let offset = range.start;
    let data = source.read_range(range)?;
    Ok(Chunk {
        index,
        offset,
        data,
        checksum: None,
    })
}

/// A file on disk, opened read-only.
pub struct FileSource {
    file: Mutex<std::fs::File>,
    len: u64,
    path: PathBuf,
}

impl FileSource {
    /// Opens `path` and records its current size.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
            path: path.to_path_buf(),
        })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>, TransferError> {
        if range.end > self.len {
            return Err(TransferError::SourceSizeMismatch {
                expected: range.end,
                actual: self.len,
            });
        }
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(range.start))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// An in-memory source.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl ChunkSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>, TransferError> {
        let len = self.len();
        if range.start > range.end || range.end > len {
            return Err(TransferError::SourceSizeMismatch {
                expected: range.end,
                actual: len,
            });
        }
        Ok(self.data[range.start as usize..range.end as usize].to_vec())
    }
}
