use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Default chunk size: 10 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Files smaller than this (100 MiB) use the single-request upload instead.
pub const LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Timeout for init, missing-chunk, finalize and cancel requests.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a single chunk upload.
///
/// A 10 MiB body over a slow uplink takes far longer than a JSON round trip.
pub const CHUNK_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Base path shared by all chunked-upload endpoints.
pub const CHUNKED_API_PREFIX: &str = "/api/media/chunked";

/// Multipart field carrying the chunk index.
pub const FIELD_CHUNK_NUMBER: &str = "chunkNumber";

/// Multipart field carrying the chunk bytes.
pub const FIELD_CHUNK: &str = "chunk";

/// Multipart field carrying the optional chunk checksum.
pub const FIELD_CHECKSUM: &str = "checksum";

/// HTTP verb used by an [`Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

/// One operation of the chunked upload API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    /// Opens a session. Parameters travel in the query string.
    Init,
    /// Uploads one chunk of the given upload.
    UploadChunk(&'a str),
    /// Lists chunk indices the server has not yet persisted.
    MissingChunks(&'a str),
    /// Assembles all chunks into the stored media file.
    Finalize(&'a str),
    /// Deletes the session and its partial data.
    Cancel(&'a str),
}

impl Endpoint<'_> {
    /// Returns the HTTP method for this endpoint.
    pub fn method(&self) -> HttpMethod {
        match self {
            Endpoint::MissingChunks(_) => HttpMethod::Get,
            Endpoint::Cancel(_) => HttpMethod::Delete,
            Endpoint::Init | Endpoint::UploadChunk(_) | Endpoint::Finalize(_) => HttpMethod::Post,
        }
    }

    /// Returns the request path, with the upload ID percent-encoded.
    pub fn path(&self) -> String {
        match self {
            Endpoint::Init => format!("{CHUNKED_API_PREFIX}/init"),
            Endpoint::UploadChunk(id) => format!("{CHUNKED_API_PREFIX}/upload/{}", encode(id)),
            Endpoint::MissingChunks(id) => format!("{CHUNKED_API_PREFIX}/missing/{}", encode(id)),
            Endpoint::Finalize(id) => format!("{CHUNKED_API_PREFIX}/finalize/{}", encode(id)),
            Endpoint::Cancel(id) => format!("{CHUNKED_API_PREFIX}/{}", encode(id)),
        }
    }
}

/// Characters escaped in an upload ID path segment. Dots stay escaped so an
/// ID can never normalise into `..`.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'~');

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_paths() {
        assert_eq!(Endpoint::Init.path(), "/api/media/chunked/init");
        assert_eq!(
            Endpoint::UploadChunk("abc123").path(),
            "/api/media/chunked/upload/abc123"
        );
        assert_eq!(
            Endpoint::MissingChunks("abc123").path(),
            "/api/media/chunked/missing/abc123"
        );
        assert_eq!(
            Endpoint::Finalize("abc123").path(),
            "/api/media/chunked/finalize/abc123"
        );
        assert_eq!(Endpoint::Cancel("abc123").path(), "/api/media/chunked/abc123");
    }

    #[test]
    fn endpoint_methods() {
        assert_eq!(Endpoint::Init.method(), HttpMethod::Post);
        assert_eq!(Endpoint::UploadChunk("u").method(), HttpMethod::Post);
        assert_eq!(Endpoint::MissingChunks("u").method(), HttpMethod::Get);
        assert_eq!(Endpoint::Finalize("u").method(), HttpMethod::Post);
        assert_eq!(Endpoint::Cancel("u").method(), HttpMethod::Delete);
    }

    #[test]
    fn upload_id_is_percent_encoded() {
        assert_eq!(
            Endpoint::UploadChunk("5f1c-9a_e").path(),
            "/api/media/chunked/upload/5f1c-9a_e"
        );
        assert_eq!(
            Endpoint::Finalize("../init").path(),
            "/api/media/chunked/finalize/%2E%2E%2Finit"
        );
    }

    #[test]
    fn threshold_exceeds_chunk_size() {
        assert!(LARGE_FILE_THRESHOLD > DEFAULT_CHUNK_SIZE);
    }
}
