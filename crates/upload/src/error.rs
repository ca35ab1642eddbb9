//! Upload error types.

use lexicon_protocol::UploadState;
use lexicon_transfer::TransferError;

use crate::transport::TransportError;

/// Errors produced by the upload session manager.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("init failed: {0}")]
    Init(#[source] TransportError),

    #[error("chunk {index} upload failed: {source}")]
    ChunkUpload {
        index: u32,
        #[source]
        source: TransportError,
    },

    #[error("missing-chunks query failed: {0}")]
    MissingQuery(#[source] TransportError),

    #[error("finalize failed: {0}")]
    Finalize(#[source] TransportError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("cancelled")]
    Cancelled,

    #[error("cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: UploadState,
    },
}

impl UploadError {
    /// Returns `true` if a later `resume` may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::ChunkUpload { .. } | UploadError::MissingQuery(_) | UploadError::Finalize(_)
        )
    }
}
