//! Upload client types.

use lexicon_protocol::{
    DEFAULT_CHUNK_SIZE, LARGE_FILE_THRESHOLD, MediaFile, UploadProgress, UploadState,
};
use lexicon_transfer::ChecksumAlgorithm;
use serde::{Deserialize, Serialize};

/// Tunables for chunked uploads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Bytes per chunk.
    pub chunk_size: u64,
    /// Sources at least this large go through the chunked protocol.
    pub large_file_threshold: u64,
    /// Digest attached to every chunk.
    pub checksum: ChecksumAlgorithm,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            large_file_threshold: LARGE_FILE_THRESHOLD,
            checksum: ChecksumAlgorithm::default(),
        }
    }
}

impl UploadConfig {
    /// Returns `true` if a source of `size` bytes needs the chunked protocol.
    pub fn requires_chunked_upload(&self, size: u64) -> bool {
        size >= self.large_file_threshold
    }
}

/// How a run of `start` or `resume` ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Finalized; carries the stored media file.
    Completed(MediaFile),
    /// Stopped at a chunk boundary after `pause`.
    Paused,
}

/// Events emitted by the session manager.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// The session moved to a new lifecycle state.
    StateChanged { state: UploadState },
    /// The server stored a chunk.
    ChunkUploaded { index: u32, progress: UploadProgress },
    /// Finalize succeeded.
    Completed { artifact: MediaFile },
    /// The session entered `Failed`.
    Failed { error: String },
}
