//! Session transport trait.
//!
//! `SessionTransport` is the seam between the session state machine and the
//! wire. [`crate::HttpTransport`] talks to the media server; tests plug in
//! in-memory mocks.

use std::future::Future;
use std::pin::Pin;

use lexicon_protocol::{
    FinalizeResponse, InitUploadRequest, InitUploadResponse, MissingChunksResponse,
    UploadChunkRequest, UploadChunkResponse,
};

/// Errors from a transport call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("chunk rejected by server")]
    Rejected,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),
}

/// Boxed future returned by [`SessionTransport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// The five remote operations of the chunked upload protocol.
///
/// Implementations only serialize and deserialize; all ordering and
/// state decisions belong to the session manager.
pub trait SessionTransport: Send + Sync {
    /// Opens a session.
    fn init<'a>(&'a self, req: &'a InitUploadRequest) -> TransportFuture<'a, InitUploadResponse>;

    /// Sends one chunk.
    fn upload_chunk(&self, req: UploadChunkRequest) -> TransportFuture<'_, UploadChunkResponse>;

    /// Lists the chunk indices the server has not persisted.
    fn missing_chunks<'a>(&'a self, upload_id: &'a str) -> TransportFuture<'a, MissingChunksResponse>;

    /// Assembles the uploaded chunks into the stored media file.
    fn finalize<'a>(&'a self, upload_id: &'a str) -> TransportFuture<'a, FinalizeResponse>;

    /// Deletes the session server-side.
    fn cancel<'a>(&'a self, upload_id: &'a str) -> TransportFuture<'a, ()>;
}
