//! Blob store abstraction

use async_trait::async_trait;

use crate::error::StorageError;

/// Remote object storage for PDFs and thumbnails
///
/// Objects are addressed by a public id returned from the upload calls.
/// Uploading to an existing id replaces the object.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a raw (non-image) object and return its public id
    async fn upload_raw(&self, data: Vec<u8>, name: &str) -> Result<String, StorageError>;

    /// Store a JPEG image and return its public id
    async fn upload_image(&self, data: Vec<u8>, name: &str) -> Result<String, StorageError>;

    /// Time-limited URL that fetches the object with a plain GET
    async fn signed_url(&self, public_id: &str) -> Result<String, StorageError>;

    /// Remove an object. Returns false when there was nothing to remove.
    async fn delete(&self, public_id: &str) -> Result<bool, StorageError>;
}

/// Object name of a book's PDF
pub fn pdf_object_name(book_id: &str) -> String {
    format!("pdfs/{}", book_id)
}

/// Object name of a book's thumbnail
pub fn thumbnail_object_name(book_id: &str) -> String {
    format!("thumbnails/{}", book_id)
}
