use async_trait::async_trait;
use tracing::{info, warn};

use crate::{non_empty, ExtractError, TextExtractor};

/// Extracts the text layer of a PDF with `pdf-extract`. Scanned PDFs without
/// a text layer come back empty and are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String, ExtractError> {
        let size = bytes.len();
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ExtractError::Pdf(format!("extraction task failed: {e}")))?
            .map_err(|e| {
                warn!(size, "pdf extraction failed: {e}");
                ExtractError::Pdf(e.to_string())
            })?;
        info!(size, text_len = text.len(), "pdf text extracted");
        non_empty(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_bytes_are_a_pdf_error() {
        let err = PdfExtractor
            .extract(b"definitely not a pdf".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }
}
