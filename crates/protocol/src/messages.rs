use serde::{Deserialize, Deserializer, Serialize};

use crate::types::MediaType;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens a chunked upload session.
///
/// Sent as URL query parameters of `POST /api/media/chunked/init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub filename: String,
    pub content_type: String,
    pub total_size: u64,
    pub chunk_size: u64,
    /// Owner of the resulting media file.
    pub user_id: String,
    pub title: String,
    /// Empty when the caller gave no description.
    #[serde(default)]
    pub description: String,
    pub is_public: bool,
    pub media_type: MediaType,
}

/// One chunk ready for transfer.
///
/// Sent as `multipart/form-data`; see [`crate::constants::FIELD_CHUNK`].
#[derive(Debug, Clone, PartialEq)]
pub struct UploadChunkRequest {
    pub upload_id: String,
    pub chunk_index: u32,
    pub data: Vec<u8>,
    /// Lowercase hex digest of `data`; `None` when hashing is unavailable.
    pub checksum: Option<String>,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Acknowledges session initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub upload_id: String,
    pub total_chunks: u32,
}

/// Acknowledges a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkResponse {
    /// Servers that omit the flag accept every chunk they answer with 2xx.
    #[serde(default = "default_true")]
    pub accepted: bool,
    /// Set once the server holds every chunk of the upload.
    #[serde(default)]
    pub is_complete: bool,
}

/// Chunk indices the server has not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingChunksResponse {
    #[serde(alias = "missingChunkIndices")]
    pub missing_chunks: Vec<u32>,
}

/// Result of assembling all chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub media_file: MediaFile,
}

/// Stored-object descriptor returned by finalize.
///
/// Only the fields the client acts on are typed; everything else the server
/// sends is preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default)]
    pub is_public: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// Accepts numeric database IDs as well as string IDs.
fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_request_field_names() {
        let req = InitUploadRequest {
            filename: "movie.mkv".into(),
            content_type: "video/x-matroska".into(),
            total_size: 26_214_400,
            chunk_size: 10_485_760,
            user_id: "42".into(),
            title: "Movie".into(),
            description: String::new(),
            is_public: false,
            media_type: MediaType::Video,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["contentType"], "video/x-matroska");
        assert_eq!(json["totalSize"], 26_214_400);
        assert_eq!(json["chunkSize"], 10_485_760);
        assert_eq!(json["userId"], "42");
        assert_eq!(json["isPublic"], false);
        assert_eq!(json["mediaType"], "VIDEO");
        assert_eq!(json["description"], "");
    }

    #[test]
    fn init_response_parses() {
        let resp: InitUploadResponse =
            serde_json::from_str(r#"{"uploadId":"up-1","totalChunks":3}"#).unwrap();
        assert_eq!(resp.upload_id, "up-1");
        assert_eq!(resp.total_chunks, 3);
    }

    #[test]
    fn chunk_response_defaults() {
        let resp: UploadChunkResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.accepted);
        assert!(!resp.is_complete);

        let resp: UploadChunkResponse =
            serde_json::from_str(r#"{"accepted":false,"isComplete":true}"#).unwrap();
        assert!(!resp.accepted);
        assert!(resp.is_complete);
    }

    #[test]
    fn missing_chunks_accepts_both_field_names() {
        let a: MissingChunksResponse =
            serde_json::from_str(r#"{"missingChunks":[2,5]}"#).unwrap();
        let b: MissingChunksResponse =
            serde_json::from_str(r#"{"missingChunkIndices":[2,5]}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.missing_chunks, vec![2, 5]);
    }

    #[test]
    fn media_file_numeric_id_and_extra_fields() {
        let json = r#"{"mediaFile":{"id":917,"title":"Concert","mediaType":"VIDEO",
            "isPublic":true,"fileSize":26214400,"originalFilename":"concert.mp4"}}"#;
        let resp: FinalizeResponse = serde_json::from_str(json).unwrap();
        let file = resp.media_file;
        assert_eq!(file.id, "917");
        assert_eq!(file.title, "Concert");
        assert_eq!(file.media_type, MediaType::Video);
        assert!(file.is_public);
        assert_eq!(file.extra["fileSize"], 26_214_400);
        assert_eq!(file.extra["originalFilename"], "concert.mp4");
    }

    #[test]
    fn media_file_string_id() {
        let file: MediaFile = serde_json::from_str(r#"{"id":"a1b2"}"#).unwrap();
        assert_eq!(file.id, "a1b2");
        assert_eq!(file.media_type, MediaType::Other);
        assert!(file.extra.is_empty());
    }
}
