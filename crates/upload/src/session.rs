//! Upload session manager.
//!
//! Owns the [`UploadSession`] of one source file and drives it through the
//! chunked protocol. Chunks go out strictly in ascending index order with at
//! most one request in flight. `pause` takes effect at the next chunk
//! boundary; `cancel` resets local state immediately and discards whatever
//! the in-flight request returns afterwards. A session the server opens
//! after `cancel` (or with the wrong chunk count) is deleted again.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Instant;

use lexicon_protocol::{MediaFile, UploadChunkRequest, UploadProgress, UploadState};
use lexicon_transfer::{
    Chunk, ChunkSource, FailureKind, IntegrityHasher, ProgressReporter, SessionFailure,
    TransferError, UploadMetadata, UploadSession, read_chunk, validate_upload,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::UploadError;
use crate::transport::{SessionTransport, TransportError};
use crate::types::{RunOutcome, UploadConfig, UploadEvent};

/// Drives one resumable upload.
///
/// Shared behind an [`Arc`]; every method takes `&self`, so `pause`,
/// `cancel` and `progress` can be called while `start` or `resume` is
/// running on another task.
pub struct UploadSessionManager {
    transport: Arc<dyn SessionTransport>,
    source: Arc<dyn ChunkSource>,
    metadata: UploadMetadata,
    hasher: IntegrityHasher,
    inner: RwLock<Inner>,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<UploadEvent>>>,
}

struct Inner {
    session: UploadSession,
    reporter: ProgressReporter,
    pause_requested: bool,
    artifact: Option<MediaFile>,
}

impl UploadSessionManager {
    /// Creates a manager for a fresh upload of `source`.
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        source: Arc<dyn ChunkSource>,
        metadata: UploadMetadata,
        config: &UploadConfig,
    ) -> Result<Self, UploadError> {
        validate_upload(source.len(), config.chunk_size, &metadata)?;
        let session = UploadSession::new(source.len(), config.chunk_size);
        Ok(Self::with_session(transport, source, metadata, config, session))
    }

    /// Creates a manager for an upload the server already knows as
    /// `upload_id`, e.g. after a process restart. Call [`resume`](Self::resume)
    /// to continue it.
    pub fn attach(
        transport: Arc<dyn SessionTransport>,
        source: Arc<dyn ChunkSource>,
        metadata: UploadMetadata,
        config: &UploadConfig,
        upload_id: impl Into<String>,
    ) -> Result<Self, UploadError> {
        validate_upload(source.len(), config.chunk_size, &metadata)?;
        let session = UploadSession::new(source.len(), config.chunk_size).with_session_id(upload_id);
        Ok(Self::with_session(transport, source, metadata, config, session))
    }

    fn with_session(
        transport: Arc<dyn SessionTransport>,
        source: Arc<dyn ChunkSource>,
        metadata: UploadMetadata,
        config: &UploadConfig,
        session: UploadSession,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        let reporter = ProgressReporter::new(session.source_size());
        Self {
            transport,
            source,
            metadata,
            hasher: IntegrityHasher::new(config.checksum),
            inner: RwLock::new(Inner {
                session,
                reporter,
                pause_requested: false,
                artifact: None,
            }),
            cancel: CancellationToken::new(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Events are dropped while the channel is full.
    pub fn take_events(&self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> UploadState {
        self.read(|inner| inner.session.state())
    }

    /// Server-assigned upload id, once known.
    pub fn upload_id(&self) -> Option<String> {
        self.read(|inner| inner.session.session_id().map(str::to_string))
    }

    /// The failure that put the session in `Failed`.
    pub fn last_error(&self) -> Option<SessionFailure> {
        self.read(|inner| inner.session.last_error().cloned())
    }

    /// The stored media file, once completed.
    pub fn artifact(&self) -> Option<MediaFile> {
        self.read(|inner| inner.artifact.clone())
    }

    /// Metadata the upload was created with.
    pub fn metadata(&self) -> &UploadMetadata {
        &self.metadata
    }

    /// Snapshot of chunk counts, bytes, rate and ETA. Never waits on I/O.
    pub fn progress(&self) -> UploadProgress {
        self.read(snapshot)
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Opens a new server session and uploads every chunk, then finalizes.
    ///
    /// Valid from `Uninitialized`, or from `Failed` when init never produced
    /// an upload id.
    pub async fn start(&self) -> Result<RunOutcome, UploadError> {
        self.begin_run("start", UploadState::Initializing, |session| {
            session.session_id().is_none()
                && matches!(
                    session.state(),
                    UploadState::Uninitialized | UploadState::Failed
                )
        })?;

        let total_size = self.source.len();
        let chunk_size = self.read(|inner| inner.session.chunk_size());
        let req = self.metadata.init_request(total_size, chunk_size);
        info!(filename = %req.filename, total_size, chunk_size, "initializing upload");

        // Init is not raced against cancellation: its response names the
        // server session that has to be deleted if the run cannot adopt it.
        let resp = match self.transport.init(&req).await {
            Ok(resp) => resp,
            Err(e) => return Err(self.fail(FailureKind::Init, UploadError::Init(e))),
        };

        let expected = self.read(|inner| inner.session.total_chunks());
        if resp.total_chunks != expected {
            self.discard_server_session(&resp.upload_id).await;
            let e = TransportError::UnexpectedResponse(format!(
                "server expects {} chunks, client computed {expected}",
                resp.total_chunks
            ));
            return Err(self.fail(FailureKind::Init, UploadError::Init(e)));
        }

        if let Err(e) = self.update(|inner| inner.session.set_session_id(resp.upload_id.clone())) {
            self.discard_server_session(&resp.upload_id).await;
            return Err(e);
        }
        info!(upload_id = %resp.upload_id, total_chunks = resp.total_chunks, "upload initialized");
        self.set_state(UploadState::Transferring)?;

        let pending = self.read(|inner| inner.session.pending_chunks());
        self.transfer(&resp.upload_id, pending).await
    }

    /// Continues a paused, failed or attached upload.
    ///
    /// Asks the server which chunks it is missing and uploads exactly those,
    /// in ascending order. An empty list goes straight to finalize.
    pub async fn resume(&self) -> Result<RunOutcome, UploadError> {
        self.begin_run("resume", UploadState::Transferring, |session| {
            session.session_id().is_some()
                && matches!(
                    session.state(),
                    UploadState::Uninitialized | UploadState::Paused | UploadState::Failed
                )
        })?;

        let upload_id = self
            .upload_id()
            .ok_or(UploadError::InvalidState {
                op: "resume",
                state: UploadState::Uninitialized,
            })?;

        let missing = match self.guarded(self.transport.missing_chunks(&upload_id)).await? {
            Ok(resp) => resp.missing_chunks,
            Err(e) => return Err(self.fail(FailureKind::MissingQuery, UploadError::MissingQuery(e))),
        };

        let missing = self.update(|inner| reconcile(&mut inner.session, missing))??;
        info!(upload_id = %upload_id, missing = missing.len(), "resuming upload");

        self.transfer(&upload_id, missing).await
    }

    /// Requests a pause at the next chunk boundary.
    ///
    /// No-op when already paused, failed or terminal.
    pub fn pause(&self) -> Result<(), UploadError> {
        let mut inner = self.write();
        match inner.session.state() {
            UploadState::Transferring => {
                if !inner.pause_requested {
                    info!("pause requested");
                }
                inner.pause_requested = true;
                Ok(())
            }
            UploadState::Paused
            | UploadState::Failed
            | UploadState::Completed
            | UploadState::Cancelled => Ok(()),
            state => Err(UploadError::InvalidState { op: "pause", state }),
        }
    }

    /// Cancels the upload.
    ///
    /// Local state is reset before anything else: the session id and the
    /// uploaded set are cleared and the state becomes `Cancelled`. The server
    /// is then asked to delete the session; failures there are logged only.
    pub async fn cancel(&self) -> Result<(), UploadError> {
        let upload_id = {
            let mut inner = self.write();
            match inner.session.state() {
                UploadState::Cancelled => return Ok(()),
                UploadState::Completed => {
                    return Err(UploadError::InvalidState {
                        op: "cancel",
                        state: UploadState::Completed,
                    });
                }
                _ => {}
            }

            let upload_id = inner.session.session_id().map(str::to_string);
            inner.session.reset();
            inner.reporter.reset();
            inner.pause_requested = false;
            self.cancel.cancel();
            self.emit(UploadEvent::StateChanged {
                state: UploadState::Cancelled,
            });
            upload_id
        };
        info!(upload_id = ?upload_id, "upload cancelled");

        if let Some(id) = upload_id
            && let Err(e) = self.transport.cancel(&id).await
        {
            warn!(upload_id = %id, error = %e, "server-side cancel failed");
        }
        Ok(())
    }

    /// Best-effort delete of a server session this manager will not use.
    async fn discard_server_session(&self, upload_id: &str) {
        debug!(upload_id, "deleting unused server session");
        if let Err(e) = self.transport.cancel(upload_id).await {
            warn!(upload_id, error = %e, "server-side cancel failed");
        }
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    /// Uploads `indices` in order, then finalizes.
    async fn transfer(&self, upload_id: &str, indices: Vec<u32>) -> Result<RunOutcome, UploadError> {
        self.update(|inner| {
            let bytes = inner.session.bytes_uploaded();
            inner.reporter.rebase(bytes, Instant::now());
        })?;

        let chunk_size = self.read(|inner| inner.session.chunk_size());

        for index in indices {
            if self.pause_at_boundary()? {
                return Ok(RunOutcome::Paused);
            }

            let chunk = match self.read_source(index, chunk_size).await {
                Ok(chunk) => chunk,
                Err(e) => return Err(self.fail(FailureKind::Source, UploadError::Transfer(e))),
            };
            debug!(
                upload_id,
                index,
                offset = chunk.offset,
                len = chunk.data.len(),
                checksum = chunk.checksum.is_some(),
                "uploading chunk"
            );

            let req = UploadChunkRequest {
                upload_id: upload_id.to_string(),
                chunk_index: index,
                data: chunk.data,
                checksum: chunk.checksum,
            };
            let resp = match self.guarded(self.transport.upload_chunk(req)).await? {
                Ok(resp) if resp.accepted => resp,
                Ok(_) => {
                    let e = UploadError::ChunkUpload {
                        index,
                        source: TransportError::Rejected,
                    };
                    return Err(self.fail(FailureKind::ChunkUpload { index }, e));
                }
                Err(source) => {
                    let e = UploadError::ChunkUpload { index, source };
                    return Err(self.fail(FailureKind::ChunkUpload { index }, e));
                }
            };

            self.update(|inner| -> Result<(), UploadError> {
                inner.session.mark_uploaded(index)?;
                inner.reporter.record(inner.session.bytes_uploaded());
                self.emit(UploadEvent::ChunkUploaded {
                    index,
                    progress: snapshot(inner),
                });
                Ok(())
            })??;

            if resp.is_complete {
                debug!(upload_id, index, "server reports all chunks received");
                break;
            }
        }

        if self.pause_at_boundary()? {
            return Ok(RunOutcome::Paused);
        }
        self.finalize(upload_id).await
    }

    async fn finalize(&self, upload_id: &str) -> Result<RunOutcome, UploadError> {
        self.set_state(UploadState::Finalizing)?;
        info!(upload_id, "finalizing upload");

        let media_file = match self.guarded(self.transport.finalize(upload_id)).await? {
            Ok(resp) => resp.media_file,
            Err(e) => return Err(self.fail(FailureKind::Finalize, UploadError::Finalize(e))),
        };

        self.update(|inner| {
            inner.session.complete();
            inner.artifact = Some(media_file.clone());
            self.emit(UploadEvent::StateChanged {
                state: UploadState::Completed,
            });
            self.emit(UploadEvent::Completed {
                artifact: media_file.clone(),
            });
        })?;
        info!(upload_id, media_id = %media_file.id, "upload completed");

        Ok(RunOutcome::Completed(media_file))
    }

    /// Reads and hashes chunk `index` off the async runtime.
    async fn read_source(&self, index: u32, chunk_size: u64) -> Result<Chunk, TransferError> {
        let source = Arc::clone(&self.source);
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || {
            read_chunk(source.as_ref(), index, chunk_size).map(|c| c.with_checksum(&hasher))
        })
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
    }

    // -----------------------------------------------------------------------
    // State helpers
    // -----------------------------------------------------------------------

    /// Claims the session for a run: if `allowed` holds, moves to `next`
    /// under the same lock so a second caller sees a running state.
    fn begin_run(
        &self,
        op: &'static str,
        next: UploadState,
        allowed: impl FnOnce(&UploadSession) -> bool,
    ) -> Result<(), UploadError> {
        let mut inner = self.write();
        let state = inner.session.state();
        if self.cancel.is_cancelled() || !allowed(&inner.session) {
            return Err(UploadError::InvalidState { op, state });
        }
        inner.pause_requested = false;
        inner.session.set_state(next);
        self.emit(UploadEvent::StateChanged { state: next });
        Ok(())
    }

    /// Moves to `Paused` if a pause was requested.
    fn pause_at_boundary(&self) -> Result<bool, UploadError> {
        self.update(|inner| {
            if !inner.pause_requested {
                return false;
            }
            inner.pause_requested = false;
            inner.session.set_state(UploadState::Paused);
            self.emit(UploadEvent::StateChanged {
                state: UploadState::Paused,
            });
            info!(
                uploaded = inner.session.uploaded_count(),
                total = inner.session.total_chunks(),
                "upload paused"
            );
            true
        })
    }

    fn set_state(&self, state: UploadState) -> Result<(), UploadError> {
        self.update(|inner| {
            if inner.session.state() != state {
                inner.session.set_state(state);
                self.emit(UploadEvent::StateChanged { state });
            }
        })
    }

    /// Records `err` as the session failure and returns it.
    ///
    /// After a cancel the failure is discarded and `Cancelled` is returned.
    fn fail(&self, kind: FailureKind, err: UploadError) -> UploadError {
        let mut inner = self.write();
        if self.cancel.is_cancelled() {
            return UploadError::Cancelled;
        }

        let message = match &err {
            UploadError::Init(e)
            | UploadError::MissingQuery(e)
            | UploadError::Finalize(e)
            | UploadError::ChunkUpload { source: e, .. } => e.to_string(),
            UploadError::Transfer(e) => e.to_string(),
            other => other.to_string(),
        };
        inner.session.fail(kind, message);
        error!(
            upload_id = ?inner.session.session_id(),
            error = %err,
            "upload failed"
        );
        self.emit(UploadEvent::StateChanged {
            state: UploadState::Failed,
        });
        self.emit(UploadEvent::Failed {
            error: err.to_string(),
        });
        err
    }

    /// Awaits `fut` unless the upload is cancelled first.
    async fn guarded<T>(
        &self,
        fut: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<Result<T, TransportError>, UploadError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UploadError::Cancelled),
            result = fut => Ok(result),
        }
    }

    /// Applies `f` under the write lock unless the upload was cancelled.
    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> Result<R, UploadError> {
        let mut inner = self.write();
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(f(&mut inner))
    }

    fn read<R>(&self, f: impl FnOnce(&Inner) -> R) -> R {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

fn snapshot(inner: &Inner) -> UploadProgress {
    let session = &inner.session;
    UploadProgress {
        upload_id: session.session_id().map(str::to_string),
        state: session.state(),
        uploaded_chunks: session.uploaded_count(),
        total_chunks: session.total_chunks(),
        bytes_transferred: session.bytes_uploaded(),
        total_bytes: session.source_size(),
        speed_bytes_per_sec: inner.reporter.bytes_per_second(),
        eta_seconds: inner.reporter.eta().map(|d| d.as_secs_f64()),
    }
}

/// Normalizes the server's missing list and records every other chunk as
/// uploaded. Returns the indices still to send, ascending and unique.
fn reconcile(session: &mut UploadSession, mut missing: Vec<u32>) -> Result<Vec<u32>, UploadError> {
    let total = session.total_chunks();
    missing.sort_unstable();
    missing.dedup();

    let ignored: Vec<u32> = missing.iter().copied().filter(|&i| i >= total).collect();
    if !ignored.is_empty() {
        warn!(?ignored, total, "ignoring out-of-range missing chunk indices");
        missing.retain(|&i| i < total);
    }

    for index in 0..total {
        if missing.binary_search(&index).is_err() {
            session.mark_uploaded(index)?;
        }
    }
    Ok(missing)
}
