//! PDF processing
//!
//! Text extraction for the search index and first-page thumbnails, both
//! backed by MuPDF and run off the async scheduler.

mod text;
mod thumbnail;

pub use text::{MupdfTextExtractor, TextExtractor};
pub use thumbnail::{MupdfThumbnailer, ThumbnailGenerator};

use thiserror::Error;

/// PDF processing errors
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to load PDF: {0}")]
    LoadError(String),
    #[error("Document has no pages")]
    Empty,
    #[error("Image encoding error: {0}")]
    ImageError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("MuPDF error: {0}")]
    MuPdfError(String),
    #[error("Worker task failed: {0}")]
    Join(String),
}

impl From<mupdf::Error> for PdfError {
    fn from(e: mupdf::Error) -> Self {
        PdfError::MuPdfError(e.to_string())
    }
}

impl From<tokio::task::JoinError> for PdfError {
    fn from(e: tokio::task::JoinError) -> Self {
        PdfError::Join(e.to_string())
    }
}

fn open_document(path: &std::path::Path) -> Result<mupdf::Document, PdfError> {
    let path_str = path.to_string_lossy();
    mupdf::Document::open(&*path_str).map_err(|e| PdfError::LoadError(e.to_string()))
}
