use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{open_document, PdfError};

/// Pulls the searchable text out of a stored PDF
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String, PdfError>;
}

/// MuPDF-backed extractor
///
/// Page texts are trimmed, empty pages dropped, and the rest joined with a
/// single newline.
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfTextExtractor;

impl MupdfTextExtractor {
    fn extract_blocking(path: &Path) -> Result<String, PdfError> {
        let doc = open_document(path)?;
        let page_count = doc.page_count()?;

        let mut fragments = Vec::with_capacity(page_count.max(0) as usize);
        for index in 0..page_count {
            let page = doc.load_page(index)?;
            let text = page.to_text()?;
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                fragments.push(trimmed.to_string());
            }
        }

        Ok(fragments.join("\n"))
    }
}

#[async_trait]
impl TextExtractor for MupdfTextExtractor {
    async fn extract(&self, path: &Path) -> Result<String, PdfError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::extract_blocking(&path)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_garbage_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();

        let result = MupdfTextExtractor.extract(&path).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = MupdfTextExtractor.extract(&dir.path().join("absent.pdf")).await;
        assert!(matches!(result, Err(PdfError::LoadError(_))));
    }
}
