pub mod pdf;
pub mod vision;

use async_trait::async_trait;

pub use pdf::PdfExtractor;
pub use vision::VisionOcr;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("could not read PDF: {0}")]
    Pdf(String),
    #[error("vision service reported an error: {0}")]
    Vision(String),
    #[error("text extraction request failed: {0:#}")]
    Request(anyhow::Error),
    #[error("no text could be extracted from the document")]
    Empty,
}

/// Turns an uploaded file into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String, ExtractError>;
}

/// Trim and reject text that is empty after trimming.
pub(crate) fn non_empty(text: String) -> Result<String, ExtractError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(trimmed.to_string())
}
