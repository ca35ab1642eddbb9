//! Chunked upload transport over HTTP.
//!
//! Async client using `reqwest`, with optional Bearer token and session
//! cookie authentication.

use std::time::Duration;

use lexicon_protocol::constants::{
    CHUNK_REQUEST_TIMEOUT, FIELD_CHECKSUM, FIELD_CHUNK, FIELD_CHUNK_NUMBER, REQUEST_TIMEOUT,
};
use lexicon_protocol::{
    Endpoint, FinalizeResponse, HttpMethod, InitUploadRequest, InitUploadResponse,
    MissingChunksResponse, UploadChunkRequest, UploadChunkResponse,
};
use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::transport::{SessionTransport, TransportError, TransportFuture};

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportOptions {
    /// Sent as `Authorization: Bearer <token>`.
    pub auth_token: Option<String>,
    /// Sent verbatim as the `Cookie` header.
    pub session_cookie: Option<String>,
    /// Timeout for every request except chunk uploads.
    pub request_timeout: Duration,
    /// Timeout for a single chunk upload.
    pub chunk_timeout: Duration,
}

impl Default for HttpTransportOptions {
    fn default() -> Self {
        Self {
            auth_token: None,
            session_cookie: None,
            request_timeout: REQUEST_TIMEOUT,
            chunk_timeout: CHUNK_REQUEST_TIMEOUT,
        }
    }
}

/// Media server client for the chunked upload endpoints.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    chunk_timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport for the server at `base_url` (no trailing path).
    pub fn new(base_url: &str, options: HttpTransportOptions) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &options.auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| TransportError::InvalidHeader("Authorization"))?,
            );
        }
        if let Some(cookie) = &options.session_cookie {
            headers.insert(
                COOKIE,
                HeaderValue::from_str(cookie).map_err(|_| TransportError::InvalidHeader("Cookie"))?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            chunk_timeout: options.chunk_timeout,
        })
    }

    /// Server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, endpoint: Endpoint<'_>) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint.path());
        let method = match endpoint.method() {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        self.http.request(method, url)
    }

    /// Sends a request and returns the body of a 2xx response.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Vec<u8>, TransportError> {
        let resp = builder.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let body = self.send(builder).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn chunk_form(req: UploadChunkRequest) -> Result<Form, TransportError> {
    let part = Part::bytes(req.data)
        .file_name(format!("chunk_{}", req.chunk_index))
        .mime_str("application/octet-stream")?;

    let mut form = Form::new()
        .text(FIELD_CHUNK_NUMBER, req.chunk_index.to_string())
        .part(FIELD_CHUNK, part);
    if let Some(checksum) = req.checksum {
        form = form.text(FIELD_CHECKSUM, checksum);
    }
    Ok(form)
}

impl SessionTransport for HttpTransport {
    fn init<'a>(&'a self, req: &'a InitUploadRequest) -> TransportFuture<'a, InitUploadResponse> {
        Box::pin(async move {
            debug!(filename = %req.filename, total_size = req.total_size, "init upload");
            self.send_json(self.request(Endpoint::Init).query(req)).await
        })
    }

    fn upload_chunk(&self, req: UploadChunkRequest) -> TransportFuture<'_, UploadChunkResponse> {
        Box::pin(async move {
            let builder = self
                .request(Endpoint::UploadChunk(&req.upload_id))
                .timeout(self.chunk_timeout);
            let form = chunk_form(req)?;
            self.send_json(builder.multipart(form)).await
        })
    }

    fn missing_chunks<'a>(&'a self, upload_id: &'a str) -> TransportFuture<'a, MissingChunksResponse> {
        Box::pin(async move {
            self.send_json(self.request(Endpoint::MissingChunks(upload_id)))
                .await
        })
    }

    fn finalize<'a>(&'a self, upload_id: &'a str) -> TransportFuture<'a, FinalizeResponse> {
        Box::pin(async move { self.send_json(self.request(Endpoint::Finalize(upload_id))).await })
    }

    fn cancel<'a>(&'a self, upload_id: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.send(self.request(Endpoint::Cancel(upload_id))).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexicon_protocol::MediaType;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Reads one HTTP request (headers plus `Content-Length` body).
    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 8192];
        loop {
            let n = stream.read(&mut tmp).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&tmp[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Starts a mock HTTP server that answers one request with `status` and
    /// `body`, and hands back the raw request it received.
    async fn mock_server(status: u16, body: &str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let body = body.to_string();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await;

                let resp = format!(
                    "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
                let _ = tx.send(request);
            }
        });

        (url, rx)
    }

    fn transport(url: &str) -> HttpTransport {
        HttpTransport::new(url, HttpTransportOptions::default()).unwrap()
    }

    fn init_request() -> InitUploadRequest {
        InitUploadRequest {
            filename: "big movie.mp4".into(),
            content_type: "video/mp4".into(),
            total_size: 26_214_400,
            chunk_size: 10_485_760,
            user_id: "7".into(),
            title: "Big Movie".into(),
            description: String::new(),
            is_public: true,
            media_type: MediaType::Video,
        }
    }

    #[tokio::test]
    async fn init_sends_query_parameters() {
        let (url, rx) = mock_server(200, r#"{"uploadId":"up-1","totalChunks":3}"#).await;

        let resp = transport(&url).init(&init_request()).await.unwrap();
        assert_eq!(resp.upload_id, "up-1");
        assert_eq!(resp.total_chunks, 3);

        let request = rx.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("POST /api/media/chunked/init?"));
        assert!(request_line.contains("filename=big+movie.mp4"));
        assert!(request_line.contains("totalSize=26214400"));
        assert!(request_line.contains("chunkSize=10485760"));
        assert!(request_line.contains("userId=7"));
        assert!(request_line.contains("isPublic=true"));
        assert!(request_line.contains("mediaType=VIDEO"));
    }

    #[tokio::test]
    async fn upload_chunk_sends_multipart_fields() {
        let (url, rx) = mock_server(200, r#"{"isComplete":false}"#).await;

        let resp = transport(&url)
            .upload_chunk(UploadChunkRequest {
                upload_id: "up-1".into(),
                chunk_index: 2,
                data: b"chunk-bytes".to_vec(),
                checksum: Some("abc123".into()),
            })
            .await
            .unwrap();
        assert!(resp.accepted);
        assert!(!resp.is_complete);

        let request = rx.await.unwrap();
        assert!(request.starts_with("POST /api/media/chunked/upload/up-1 "));
        assert!(request.contains("multipart/form-data; boundary="));
        assert!(request.contains("name=\"chunkNumber\"\r\n\r\n2\r\n"));
        assert!(request.contains("name=\"chunk\"; filename=\"chunk_2\""));
        assert!(request.contains("chunk-bytes"));
        assert!(request.contains("name=\"checksum\"\r\n\r\nabc123\r\n"));
    }

    #[tokio::test]
    async fn upload_chunk_omits_absent_checksum() {
        let (url, rx) = mock_server(200, r#"{"accepted":true,"isComplete":true}"#).await;

        let resp = transport(&url)
            .upload_chunk(UploadChunkRequest {
                upload_id: "up-1".into(),
                chunk_index: 0,
                data: vec![1, 2, 3],
                checksum: None,
            })
            .await
            .unwrap();
        assert!(resp.is_complete);

        let request = rx.await.unwrap();
        assert!(!request.contains("name=\"checksum\""));
    }

    #[tokio::test]
    async fn missing_chunks_uses_get() {
        let (url, rx) = mock_server(200, r#"{"missingChunks":[2]}"#).await;

        let resp = transport(&url).missing_chunks("up-1").await.unwrap();
        assert_eq!(resp.missing_chunks, vec![2]);

        let request = rx.await.unwrap();
        assert!(request.starts_with("GET /api/media/chunked/missing/up-1 "));
    }

    #[tokio::test]
    async fn finalize_returns_media_file() {
        let (url, rx) = mock_server(
            200,
            r#"{"mediaFile":{"id":99,"title":"Big Movie","mediaType":"VIDEO","isPublic":true,"duration":120}}"#,
        )
        .await;

        let resp = transport(&url).finalize("up-1").await.unwrap();
        assert_eq!(resp.media_file.id, "99");
        assert_eq!(resp.media_file.media_type, MediaType::Video);
        assert!(resp.media_file.extra.contains_key("duration"));

        let request = rx.await.unwrap();
        assert!(request.starts_with("POST /api/media/chunked/finalize/up-1 "));
    }

    #[tokio::test]
    async fn cancel_uses_delete() {
        let (url, rx) = mock_server(200, "").await;

        transport(&url).cancel("up-1").await.unwrap();

        let request = rx.await.unwrap();
        assert!(request.starts_with("DELETE /api/media/chunked/up-1 "));
    }

    #[tokio::test]
    async fn error_status_becomes_api_error() {
        let (url, _rx) = mock_server(413, r#"{"error":"quota exceeded"}"#).await;

        let result = transport(&url).init(&init_request()).await;
        match result {
            Err(TransportError::Api { status, body }) => {
                assert_eq!(status, 413);
                assert!(body.contains("quota exceeded"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_becomes_json_error() {
        let (url, _rx) = mock_server(200, "not json").await;

        let result = transport(&url).missing_chunks("up-1").await;
        assert!(matches!(result, Err(TransportError::Json(_))));
    }

    #[tokio::test]
    async fn auth_headers_are_sent() {
        let (url, rx) = mock_server(200, r#"{"missingChunks":[]}"#).await;
        let transport = HttpTransport::new(
            &url,
            HttpTransportOptions {
                auth_token: Some("secret".into()),
                session_cookie: Some("sid=abc".into()),
                ..Default::default()
            },
        )
        .unwrap();

        transport.missing_chunks("up-1").await.unwrap();

        let request = rx.await.unwrap().to_ascii_lowercase();
        assert!(request.contains("authorization: bearer secret"));
        assert!(request.contains("cookie: sid=abc"));
    }

    #[test]
    fn invalid_token_is_rejected() {
        let result = HttpTransport::new(
            "http://localhost",
            HttpTransportOptions {
                auth_token: Some("bad\ntoken".into()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(TransportError::InvalidHeader("Authorization"))));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(transport("http://localhost:8080/").base_url(), "http://localhost:8080");
    }
}
