//! Resumable chunked upload client.
//!
//! [`UploadSessionManager`] drives one source file through the chunked
//! upload protocol: init, sequential chunk transfer, missing-chunk
//! reconciliation on resume, and finalize. The network side sits behind the
//! [`SessionTransport`] trait; [`HttpTransport`] is the `reqwest`
//! implementation used against the media server.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized -> Initializing -> Transferring -> Finalizing -> Completed
//!                                   |    ^
//!                                   v    |
//!                                  Paused
//! ```
//!
//! Any running state may drop to `Failed`, from which `resume` continues
//! (or `start` retries, if init never succeeded). `Cancelled` is terminal.

pub mod error;
pub mod http;
pub mod session;
pub mod transport;
pub mod types;

pub use error::UploadError;
pub use http::{HttpTransport, HttpTransportOptions};
pub use session::UploadSessionManager;
pub use transport::{SessionTransport, TransportError, TransportFuture};
pub use types::{RunOutcome, UploadConfig, UploadEvent};
