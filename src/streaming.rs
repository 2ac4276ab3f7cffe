//! Token-gated document streaming
//!
//! Remote books are proxied from the blob store chunk by chunk; books stored
//! only in the sandbox are read from disk in fixed 1 MiB chunks. Nothing is
//! buffered whole, and dropping the response body stops the read.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::header,
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::auth::{IssuedStreamToken, StreamClaims, StreamTokenAuthority};
use crate::db::{Book, BookRepository, DocumentRepository};
use crate::error::{AppError, Result, StorageError};
use crate::ingest::resolve_document_path;
use crate::storage::BlobStore;

/// Local read size
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Where the bytes of a stream come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Remote,
    Local,
}

/// PDF body ready to be sent
pub struct PdfStream {
    pub body: Body,
    pub content_length: Option<u64>,
    pub source: StreamSource,
}

impl IntoResponse for PdfStream {
    fn into_response(self) -> Response {
        let mut response = (
            [
                (header::CONTENT_TYPE, "application/pdf"),
                (header::CACHE_CONTROL, "private, no-store"),
            ],
            self.body,
        )
            .into_response();

        if let Some(length) = self.content_length {
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, header::HeaderValue::from(length));
        }

        response
    }
}

pub struct DocumentStreamer {
    db: SqlitePool,
    upload_dir: PathBuf,
    blob_store: Option<Arc<dyn BlobStore>>,
    tokens: Arc<dyn StreamTokenAuthority>,
    http: reqwest::Client,
    timeout: Duration,
}

impl DocumentStreamer {
    pub fn new(
        db: SqlitePool,
        upload_dir: PathBuf,
        blob_store: Option<Arc<dyn BlobStore>>,
        tokens: Arc<dyn StreamTokenAuthority>,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to configure HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            db,
            upload_dir,
            blob_store,
            tokens,
            http,
            timeout,
        }
    }

    /// Mint a stream token for a book that has at least one document
    pub async fn issue_token(&self, book_id: &str, user_id: &str) -> Result<IssuedStreamToken> {
        let book = self.book(book_id).await?;
        if !book.has_documents {
            return Err(AppError::NotFound(format!("Book {} has no document", book_id)));
        }

        let issued = self.tokens.issue(book_id, user_id)?;
        tracing::debug!(book_id = %book_id, user_id = %user_id, "Issued stream token");

        Ok(issued)
    }

    /// Open the primary document of a book for a token holder
    pub async fn open(&self, book_id: &str, token: &str) -> Result<(PdfStream, StreamClaims)> {
        let book = self.book(book_id).await?;
        let claims = self.tokens.verify(token, book_id)?;

        let stream = match (&book.pdf_public_id, &self.blob_store) {
            (Some(public_id), Some(store)) => self.open_remote(store.as_ref(), public_id).await?,
            (Some(public_id), None) => {
                tracing::warn!(
                    book_id = %book_id,
                    public_id = %public_id,
                    "Book is stored remotely but no blob store is configured"
                );
                self.open_local(book_id).await?
            }
            (None, _) => self.open_local(book_id).await?,
        };

        tracing::info!(
            book_id = %book_id,
            user_id = %claims.user_id,
            source = ?stream.source,
            "Streaming document"
        );

        Ok((stream, claims))
    }

    async fn book(&self, book_id: &str) -> Result<Book> {
        BookRepository::new(&self.db)
            .get(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))
    }

    async fn open_remote(&self, store: &dyn BlobStore, public_id: &str) -> Result<PdfStream> {
        let url = store.signed_url(public_id).await?;

        // Bounds the wait for the response head; the body streams unbounded
        let response = tokio::time::timeout(self.timeout, self.http.get(&url).send())
            .await
            .map_err(|_| StorageError::Timeout(self.timeout.as_secs()))?
            .map_err(StorageError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::RemoteStatus {
                key: public_id.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        Ok(PdfStream {
            content_length: response.content_length(),
            body: Body::from_stream(response.bytes_stream()),
            source: StreamSource::Remote,
        })
    }

    async fn open_local(&self, book_id: &str) -> Result<PdfStream> {
        let document = DocumentRepository::new(&self.db)
            .primary(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} has no document", book_id)))?;

        let path = resolve_document_path(&self.upload_dir, &document.filename).await?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound("Document file not found".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let length = file.metadata().await?.len();

        let chunks = futures::stream::try_unfold(file, |mut file| async move {
            let chunk = read_chunk(&mut file).await?;
            Ok::<_, std::io::Error>(chunk.map(|bytes| (bytes, file)))
        });

        Ok(PdfStream {
            body: Body::from_stream(chunks),
            content_length: Some(length),
            source: StreamSource::Local,
        })
    }
}

/// Read up to `CHUNK_SIZE` bytes; short only at end of file
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Bytes>> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut filled = 0;

    while filled < CHUNK_SIZE {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    if filled == 0 {
        return Ok(None);
    }
    buf.truncate(filled);
    Ok(Some(Bytes::from(buf)))
}
