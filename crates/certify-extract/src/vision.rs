use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{non_empty, ExtractError, TextExtractor};

/// Client for the Google Cloud Vision `images:annotate` endpoint, using
/// `DOCUMENT_TEXT_DETECTION` (dense text, suited to scanned contracts).
pub struct VisionOcr {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<FullTextAnnotation>,
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

impl VisionOcr {
    pub fn new(api_key: &str) -> Self {
        Self {
            base_url: "https://vision.googleapis.com/v1".into(),
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        if let Ok(client) = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(secs))
            .build()
        {
            self.http = client;
        }
        self
    }

    async fn annotate(&self, bytes: &[u8]) -> anyhow::Result<AnnotateResponse> {
        let body = json!({
            "requests": [{
                "image": { "content": base64::engine::general_purpose::STANDARD.encode(bytes) },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
            }]
        });
        // reqwest errors carry the request URL; drop it so nothing about the
        // endpoint or credentials reaches callers.
        let resp = self
            .http
            .post(format!("{}/images:annotate", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("vision request failed")?
            .error_for_status()
            .map_err(reqwest::Error::without_url)
            .context("vision service returned an error status")?;
        resp.json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to parse vision response")
    }
}

/// Pull the detected text out of the first image response.
fn text_from_response(response: AnnotateResponse) -> Result<String, ExtractError> {
    let image = response.responses.into_iter().next().unwrap_or_default();
    if let Some(status) = image.error {
        return Err(ExtractError::Vision(status.message));
    }
    let text = match image.full_text_annotation {
        Some(full) => full.text,
        // The first text annotation holds the whole detected block.
        None => image
            .text_annotations
            .into_iter()
            .next()
            .map(|a| a.description)
            .unwrap_or_default(),
    };
    non_empty(text)
}

#[async_trait]
impl TextExtractor for VisionOcr {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String, ExtractError> {
        info!(size = bytes.len(), "running OCR on image");
        let response = self.annotate(&bytes).await.map_err(|e| {
            warn!("OCR request failed: {e:#}");
            ExtractError::Request(e)
        })?;
        let text = text_from_response(response)?;
        info!(text_len = text.len(), "OCR text extracted");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(v: serde_json::Value) -> Result<String, ExtractError> {
        text_from_response(serde_json::from_value(v).unwrap())
    }

    #[test]
    fn full_text_annotation_is_preferred() {
        let text = parse(json!({
            "responses": [{
                "textAnnotations": [{ "description": "partial" }],
                "fullTextAnnotation": { "text": "THIS LEASE is made on 1 May.\n" }
            }]
        }))
        .unwrap();
        assert_eq!(text, "THIS LEASE is made on 1 May.");
    }

    #[test]
    fn falls_back_to_first_text_annotation() {
        let text = parse(json!({
            "responses": [{ "textAnnotations": [{ "description": "Clause 1" }, { "description": "Clause" }] }]
        }))
        .unwrap();
        assert_eq!(text, "Clause 1");
    }

    #[test]
    fn per_image_error_is_reported() {
        let err = parse(json!({
            "responses": [{ "error": { "code": 3, "message": "Bad image data." } }]
        }))
        .unwrap_err();
        match err {
            ExtractError::Vision(msg) => assert_eq!(msg, "Bad image data."),
            other => panic!("unexpected error: {other}"),
        }
    }

    // ── credential handling ──────────────────────────────────────────────────

    /// Accepts one request, answers with `status_line`, and hands back the raw
    /// request head.
    async fn one_shot_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let head_end = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                if n == 0 {
                    break buf.len();
                }
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
            let content_length = head
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length")
                        .then(|| v.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            while buf.len() < head_end + content_length {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            head
        });
        (base_url, handle)
    }

    #[tokio::test]
    async fn api_key_travels_in_header_not_url() {
        let key = "SECRET-API-KEY-123";
        let (base_url, server) = one_shot_server("HTTP/1.1 403 Forbidden").await;
        let ocr = VisionOcr::new(key).with_base_url(&base_url);

        let err = ocr.extract(b"fake image".to_vec()).await.unwrap_err();
        let head = server.await.unwrap();

        let request_line = head.lines().next().unwrap_or_default();
        assert!(!request_line.contains(key), "key leaked into URL: {request_line}");
        assert!(head.to_lowercase().contains(&format!("x-goog-api-key: {}", key.to_lowercase())));

        assert!(matches!(err, ExtractError::Request(_)));
        let shown = err.to_string();
        assert!(shown.contains("403"), "unexpected error text: {shown}");
        assert!(!shown.contains(key), "key leaked into error: {shown}");
        assert!(!format!("{err:?}").contains(key));
    }

    #[tokio::test]
    async fn transport_error_does_not_expose_key() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let key = "SECRET-API-KEY-456";
        let ocr = VisionOcr::new(key).with_base_url(&format!("http://127.0.0.1:{port}/v1"));

        let err = ocr.extract(b"fake image".to_vec()).await.unwrap_err();
        assert!(matches!(err, ExtractError::Request(_)));
        assert!(!err.to_string().contains(key));
        assert!(!err.to_string().contains("images:annotate"));
    }

    #[test]
    fn no_text_is_empty_error() {
        assert!(matches!(parse(json!({ "responses": [{}] })), Err(ExtractError::Empty)));
        assert!(matches!(parse(json!({})), Err(ExtractError::Empty)));
    }
}
