//! services/pipeline/src/adapters/extractor.rs
//!
//! This module contains the adapter that turns uploaded PDF bytes into
//! plain text. It implements the `TextExtractor` port from the core crate.
//!
//! `pdf_extract` is synchronous and can chew on a large document for a
//! while, so the work runs on the blocking thread pool.

use async_trait::async_trait;
use quizform_core::ports::{ExtractionError, TextExtractor};
use tracing::debug;

pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, document: &[u8]) -> Result<String, ExtractionError> {
        let bytes = document.to_vec();
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ExtractionError::Unreadable(format!("extraction task failed: {e}")))?
            .map_err(|e| ExtractionError::Unreadable(e.to_string()))?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }
        debug!(chars = text.len(), "extracted document text");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_bytes_are_unreadable() {
        let err = PdfTextExtractor
            .extract(b"definitely not a pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Unreadable(_)));
    }
}
