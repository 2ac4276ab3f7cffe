//! Document ingestion: stream to the sandbox, extract, thumbnail, store,
//! record

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::db::{BookRepository, Document, DocumentRepository, RecordedUpload, StoragePointers};
use crate::error::{AppError, Result};
use crate::pdf::{TextExtractor, ThumbnailGenerator};
use crate::storage::{pdf_object_name, thumbnail_object_name, BlobStore};

use super::sandbox::{partial_name, resolve_document_path, set_aside, storage_name, TempFile};

/// Declared metadata of an uploaded file part
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    pub content_type: Option<String>,
}

/// File fully written to the sandbox but not yet bound to a book
#[derive(Debug)]
pub struct StagedUpload {
    file: TempFile,
    original_name: String,
    size: u64,
    sha256: String,
}

impl StagedUpload {
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Result of a successful ingestion
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub document: Document,
    pub storage: StoragePointers,
}

/// Summary of a thumbnail regeneration run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThumbnailReport {
    pub processed: u64,
    pub updated: u64,
    pub skipped: u64,
}

/// Ingestion pipeline
///
/// Steps run strictly in order; the sandbox file is owned by the request and
/// removed on every failure path. With a blob store configured the sandbox
/// copy is also removed on success. Without one it becomes the stored copy,
/// replacing an earlier upload of the same name only once the new one is
/// recorded.
pub struct IngestionPipeline {
    db: SqlitePool,
    upload: UploadConfig,
    blob_store: Option<Arc<dyn BlobStore>>,
    extractor: Arc<dyn TextExtractor>,
    thumbnailer: Arc<dyn ThumbnailGenerator>,
}

impl IngestionPipeline {
    pub fn new(
        db: SqlitePool,
        upload: UploadConfig,
        blob_store: Option<Arc<dyn BlobStore>>,
        extractor: Arc<dyn TextExtractor>,
        thumbnailer: Arc<dyn ThumbnailGenerator>,
    ) -> Self {
        Self {
            db,
            upload,
            blob_store,
            extractor,
            thumbnailer,
        }
    }

    /// Ingest a file whose owning book is already known
    pub async fn ingest<S, E>(&self, book_id: &str, file: IncomingFile, body: S) -> Result<IngestedDocument>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        check_content_type(&file)?;
        self.require_book(book_id).await?;

        let dest = self.upload.dir.join(partial_name(book_id, &file.filename));
        let staged = self.write_stream(dest, &file.filename, body).await?;

        self.complete(book_id, staged).await
    }

    /// Stream a file into the sandbox before its book is known
    pub async fn receive<S, E>(&self, file: IncomingFile, body: S) -> Result<StagedUpload>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        check_content_type(&file)?;

        let dest = self.upload.dir.join(format!(".incoming-{}", Uuid::new_v4()));
        self.write_stream(dest, &file.filename, body).await
    }

    /// Bind a staged file to its book and finish ingestion
    pub async fn ingest_staged(&self, book_id: &str, staged: StagedUpload) -> Result<IngestedDocument> {
        self.require_book(book_id).await?;
        self.complete(book_id, staged).await
    }

    /// Rebuild local thumbnails from the stored documents
    pub async fn regenerate_thumbnails(&self, only_missing: bool, limit: Option<i64>) -> Result<ThumbnailReport> {
        let books = BookRepository::new(&self.db)
            .list_for_thumbnails(only_missing, limit)
            .await?;
        let documents = DocumentRepository::new(&self.db);

        let mut report = ThumbnailReport::default();
        for book in books {
            report.processed += 1;

            let Some(primary) = documents.primary(&book.id).await? else {
                report.skipped += 1;
                continue;
            };

            let path = match resolve_document_path(&self.upload.dir, &primary.filename).await {
                Ok(path) => path,
                Err(_) => {
                    report.skipped += 1;
                    continue;
                }
            };

            let jpeg = match self.thumbnailer.generate(&path).await {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    tracing::warn!(book_id = %book.id, "Thumbnail generation failed: {}", e);
                    report.skipped += 1;
                    continue;
                }
            };

            match self.write_local_thumbnail(&book.id, &jpeg).await {
                Ok(public_path) => {
                    BookRepository::new(&self.db)
                        .set_thumbnail_path(&book.id, &public_path)
                        .await?;
                    report.updated += 1;
                }
                Err(e) => {
                    tracing::warn!(book_id = %book.id, "Failed to write thumbnail: {}", e);
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            updated = report.updated,
            skipped = report.skipped,
            "Thumbnail regeneration finished"
        );

        Ok(report)
    }

    /// Local path of a book's generated thumbnail
    pub fn local_thumbnail_path(&self, book_id: &str) -> PathBuf {
        self.upload
            .dir
            .join("thumbnails")
            .join(format!("{}_thumb.jpg", book_id))
    }

    async fn require_book(&self, book_id: &str) -> Result<()> {
        match BookRepository::new(&self.db).get(book_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("Book {} not found", book_id))),
        }
    }

    /// Copy the body to `dest`, enforcing the size ceiling as bytes arrive
    async fn write_stream<S, E>(&self, dest: PathBuf, original_name: &str, body: S) -> Result<StagedUpload>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        tokio::fs::create_dir_all(&self.upload.dir).await?;

        let file = TempFile::new(dest.clone());
        let mut out = tokio::fs::File::create(&dest).await?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;

        let mut body = std::pin::pin!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| AppError::InvalidInput(format!("Failed to read upload: {}", e)))?;

            size += chunk.len() as u64;
            if size > self.upload.max_bytes {
                drop(out);
                file.remove().await?;
                tracing::warn!(
                    filename = %original_name,
                    max = self.upload.max_bytes,
                    "Upload rejected: size ceiling exceeded"
                );
                return Err(AppError::PayloadTooLarge {
                    max: self.upload.max_bytes,
                });
            }

            hasher.update(&chunk);
            out.write_all(&chunk).await?;
        }

        out.flush().await?;
        drop(out);

        tracing::debug!(path = %dest.display(), bytes = size, "Upload written to sandbox");

        Ok(StagedUpload {
            file,
            original_name: original_name.to_string(),
            size,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    async fn complete(&self, book_id: &str, staged: StagedUpload) -> Result<IngestedDocument> {
        let StagedUpload {
            file,
            original_name,
            size,
            sha256,
        } = staged;
        let stored_name = storage_name(book_id, &original_name);

        let content_text = match self.extractor.extract(file.path()).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(book_id = %book_id, "PDF text extraction failed: {}", e);
                file.remove().await?;
                return Err(AppError::InvalidInput("Failed to parse PDF content".to_string()));
            }
        };

        let thumbnail = if self.upload.generate_thumbnails {
            match self.thumbnailer.generate(file.path()).await {
                Ok(jpeg) => Some(jpeg),
                Err(e) => {
                    tracing::warn!(book_id = %book_id, "Thumbnail generation failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut storage = StoragePointers::default();
        let local = match &self.blob_store {
            Some(store) => {
                let data = tokio::fs::read(file.path()).await?;
                file.remove().await?;

                storage = self.upload_remote(store.as_ref(), book_id, data, thumbnail).await?;
                None
            }
            None => {
                let thumbnail = match thumbnail {
                    Some(jpeg) => match self.stage_local_thumbnail(book_id, &jpeg).await {
                        Ok(staged) => {
                            storage.thumbnail_path = Some(local_thumbnail_url(book_id));
                            Some(staged)
                        }
                        Err(e) => {
                            tracing::warn!(book_id = %book_id, "Failed to write thumbnail: {}", e);
                            None
                        }
                    },
                    None => None,
                };

                let (stored, previous) = self.promote(file, &stored_name).await?;
                storage.pdf_url = Some(format!("/uploads/{}", stored_name));

                Some(LocalCopy {
                    stored,
                    previous,
                    thumbnail,
                })
            }
        };

        let recorded = DocumentRepository::new(&self.db)
            .record_upload(&RecordedUpload {
                book_id: book_id.to_string(),
                filename: stored_name,
                content_text,
                sha256,
                size: size as i64,
                storage: storage.clone(),
            })
            .await;

        let document = match recorded {
            Ok(document) => document,
            Err(e) => {
                if storage.pdf_public_id.is_some() {
                    tracing::warn!(
                        book_id = %book_id,
                        pdf_public_id = ?storage.pdf_public_id,
                        thumbnail_public_id = ?storage.thumbnail_public_id,
                        "Metadata write failed; remote objects orphaned"
                    );
                }
                if let Some(local) = local {
                    local.roll_back().await;
                }
                return Err(e);
            }
        };

        if let Some(local) = local {
            local.commit(self.local_thumbnail_path(book_id)).await;
        }

        tracing::info!(
            book_id = %book_id,
            document_id = %document.id,
            bytes = size,
            remote = storage.pdf_public_id.is_some(),
            "Document ingested"
        );

        Ok(IngestedDocument { document, storage })
    }

    /// Move an accepted upload to its stored name, setting aside whatever a
    /// previous upload left there
    async fn promote(&self, mut file: TempFile, stored_name: &str) -> Result<(TempFile, Option<TempFile>)> {
        let target = self.upload.dir.join(stored_name);
        let previous = set_aside(&target).await?;

        if let Err(e) = file.rename(target.clone()).await {
            if let Some(previous) = previous {
                previous.restore(target).await;
            }
            return Err(e);
        }

        Ok((file, previous))
    }

    async fn upload_remote(
        &self,
        store: &dyn BlobStore,
        book_id: &str,
        data: Vec<u8>,
        thumbnail: Option<Vec<u8>>,
    ) -> Result<StoragePointers> {
        let mut storage = StoragePointers::default();

        if let Some(jpeg) = thumbnail {
            match store.upload_image(jpeg, &thumbnail_object_name(book_id)).await {
                Ok(public_id) => storage.thumbnail_public_id = Some(public_id),
                Err(e) => tracing::warn!(book_id = %book_id, "Thumbnail upload failed: {}", e),
            }
        }

        match store.upload_raw(data, &pdf_object_name(book_id)).await {
            Ok(public_id) => storage.pdf_public_id = Some(public_id),
            Err(e) => {
                tracing::error!(book_id = %book_id, "PDF upload failed: {}", e);
                if let Some(thumbnail_id) = &storage.thumbnail_public_id {
                    if let Err(e) = store.delete(thumbnail_id).await {
                        tracing::warn!(public_id = %thumbnail_id, "Failed to remove thumbnail: {}", e);
                    }
                }
                return Err(e.into());
            }
        }

        Ok(storage)
    }

    async fn write_local_thumbnail(&self, book_id: &str, jpeg: &[u8]) -> Result<String> {
        let path = self.local_thumbnail_path(book_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, jpeg).await?;

        Ok(local_thumbnail_url(book_id))
    }

    /// Write a thumbnail next to its final location; it replaces the current
    /// one only once the upload is recorded
    async fn stage_local_thumbnail(&self, book_id: &str, jpeg: &[u8]) -> Result<TempFile> {
        let path = self.local_thumbnail_path(book_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let staged = TempFile::new(path.with_file_name(format!(".{}_thumb.jpg.part", book_id)));
        tokio::fs::write(staged.path(), jpeg).await?;

        Ok(staged)
    }
}

/// Files of a local-mode upload waiting on the metadata write
struct LocalCopy {
    stored: TempFile,
    previous: Option<TempFile>,
    thumbnail: Option<TempFile>,
}

impl LocalCopy {
    /// The upload is recorded: keep it, drop the replaced copy, swap in the
    /// new thumbnail
    async fn commit(self, thumbnail_target: PathBuf) {
        self.stored.keep();

        if let Some(previous) = self.previous {
            if let Err(e) = previous.remove().await {
                tracing::warn!("Failed to remove replaced document: {}", e);
            }
        }

        if let Some(mut thumbnail) = self.thumbnail {
            match thumbnail.rename(thumbnail_target).await {
                Ok(()) => {
                    thumbnail.keep();
                }
                Err(e) => tracing::warn!("Failed to install thumbnail: {}", e),
            }
        }
    }

    /// The upload was not recorded: remove it and put back what it replaced
    async fn roll_back(self) {
        let target = self.stored.path().to_path_buf();
        if let Err(e) = self.stored.remove().await {
            tracing::warn!(path = %target.display(), "Failed to remove rejected document: {}", e);
        }

        if let Some(previous) = self.previous {
            previous.restore(target).await;
        }
    }
}

fn local_thumbnail_url(book_id: &str) -> String {
    format!("/uploads/thumbnails/{}_thumb.jpg", book_id)
}

/// The declared content type must mention PDF
fn check_content_type(file: &IncomingFile) -> Result<()> {
    let content_type = file.content_type.as_deref().unwrap_or("").to_lowercase();
    if content_type.contains("pdf") {
        Ok(())
    } else {
        Err(AppError::InvalidInput("Uploaded file must be a PDF".to_string()))
    }
}
