//! Chunked transfer primitives for resumable uploads.
//!
//! Pure building blocks with no network access: the chunk splitter and
//! chunk sources, the integrity hasher, the progress reporter, and the
//! [`UploadSession`] value type owned by the upload session manager.

mod chunked;
mod integrity;
mod progress;
mod types;
mod validation;

pub use chunked::{
    Chunk, ChunkSource, FileSource, MemorySource, chunk_range, read_chunk, total_chunks,
};
pub use integrity::{ChecksumAlgorithm, IntegrityHasher};
pub use progress::{ProgressReporter, ProgressSample, format_bytes, format_duration};
pub use types::{FailureKind, SessionFailure, UploadMetadata, UploadSession};
pub use validation::{validate_filename, validate_upload};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("chunk {index} out of range (total {total})")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("source is {actual} bytes, expected {expected}")]
    SourceSizeMismatch { expected: u64, actual: u64 },
}
