use std::collections::BTreeSet;

use lexicon_protocol::{InitUploadRequest, MediaType, UploadState};

use crate::TransferError;
use crate::chunked::{chunk_range, total_chunks};

/// Which operation a recorded failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Init,
    ChunkUpload { index: u32 },
    MissingQuery,
    Finalize,
    Source,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Init => f.write_str("init"),
            FailureKind::ChunkUpload { index } => write!(f, "chunk {index}"),
            FailureKind::MissingQuery => f.write_str("missing-chunks query"),
            FailureKind::Finalize => f.write_str("finalize"),
            FailureKind::Source => f.write_str("source read"),
        }
    }
}

/// The last error a session recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl std::fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.kind, self.message)
    }
}

/// Descriptive fields sent with the init request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    pub filename: String,
    pub content_type: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub media_type: MediaType,
}

impl UploadMetadata {
    /// Builds the init request for a source of `total_size` bytes.
    pub fn init_request(&self, total_size: u64, chunk_size: u64) -> InitUploadRequest {
        InitUploadRequest {
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            total_size,
            chunk_size,
            user_id: self.owner_id.clone(),
            title: self.title.clone(),
            description: self.description.clone().unwrap_or_default(),
            is_public: self.is_public,
            media_type: self.media_type,
        }
    }
}

/// Client-side record of one resumable upload.
///
/// `uploaded` only ever grows within a session; it is cleared by
/// [`reset`](Self::reset) together with the session id.
#[derive(Debug, Clone)]
pub struct UploadSession {
    session_id: Option<String>,
    source_size: u64,
    chunk_size: u64,
    total_chunks: u32,
    uploaded: BTreeSet<u32>,
    state: UploadState,
    last_error: Option<SessionFailure>,
}

impl UploadSession {
    /// Creates an uninitialized session for `source_size` bytes.
    pub fn new(source_size: u64, chunk_size: u64) -> Self {
        Self {
            session_id: None,
            source_size,
            chunk_size,
            total_chunks: total_chunks(source_size, chunk_size),
            uploaded: BTreeSet::new(),
            state: UploadState::Uninitialized,
            last_error: None,
        }
    }

    /// Attaches a server session id obtained earlier.
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn set_session_id(&mut self, id: impl Into<String>) {
        self.session_id = Some(id.into());
    }

    pub fn source_size(&self) -> u64 {
        self.source_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Sets the lifecycle state. Clears the last error unless entering `Failed`.
    pub fn set_state(&mut self, state: UploadState) {
        if state != UploadState::Failed {
            self.last_error = None;
        }
        self.state = state;
    }

    /// Moves to `Failed`, recording what went wrong. The session id and
    /// uploaded set are kept for a later resume.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) {
        self.state = UploadState::Failed;
        self.last_error = Some(SessionFailure {
            kind,
            message: message.into(),
        });
    }

    pub fn last_error(&self) -> Option<&SessionFailure> {
        self.last_error.as_ref()
    }

    /// Drops the session id and uploaded set, and moves to `Cancelled`.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.uploaded.clear();
        self.last_error = None;
        self.state = UploadState::Cancelled;
    }

    /// Marks every chunk uploaded and moves to `Completed`.
    pub fn complete(&mut self) {
        self.uploaded.extend(0..self.total_chunks);
        self.last_error = None;
        self.state = UploadState::Completed;
    }

    /// Records chunk `index` as stored by the server.
    ///
    /// Returns `Ok(false)` if it was already recorded.
    pub fn mark_uploaded(&mut self, index: u32) -> Result<bool, TransferError> {
        if index >= self.total_chunks {
            return Err(TransferError::ChunkOutOfRange {
                index,
                total: self.total_chunks,
            });
        }
        Ok(self.uploaded.insert(index))
    }

    pub fn is_uploaded(&self, index: u32) -> bool {
        self.uploaded.contains(&index)
    }

    /// Indices not yet recorded as uploaded, ascending.
    pub fn pending_chunks(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.uploaded.contains(i))
            .collect()
    }

    pub fn uploaded_count(&self) -> u32 {
        self.uploaded.len() as u32
    }

    /// Sum of the sizes of the uploaded chunks.
    pub fn bytes_uploaded(&self) -> u64 {
        self.uploaded
            .iter()
            .filter_map(|&i| chunk_range(i, self.source_size, self.chunk_size).ok())
            .map(|r| r.end - r.start)
            .sum()
    }

    /// Returns `true` once every chunk is recorded.
    pub fn is_complete(&self) -> bool {
        self.total_chunks > 0 && self.uploaded.len() as u32 == self.total_chunks
    }
}
