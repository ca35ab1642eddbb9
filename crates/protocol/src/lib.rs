//! Wire types for the Lexicon chunked media upload API.
//!
//! Covers the five operations of a resumable upload (init, upload chunk,
//! query missing chunks, finalize, cancel) plus the session state and
//! progress types shared by the client crates.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{DEFAULT_CHUNK_SIZE, Endpoint, HttpMethod, LARGE_FILE_THRESHOLD};
pub use messages::{
    FinalizeResponse, InitUploadRequest, InitUploadResponse, MediaFile, MissingChunksResponse,
    UploadChunkRequest, UploadChunkResponse,
};
pub use types::{MediaType, UploadProgress, UploadState};
