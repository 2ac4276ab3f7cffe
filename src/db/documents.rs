//! Document database operations

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// Uploaded document with its extracted text
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub book_id: String,
    pub filename: String,
    #[serde(skip_serializing)]
    pub content_text: String,
    pub sha256: String,
    pub size: i64,
    pub uploaded_at: String,
}

/// Document listing entry (no text)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub book_id: String,
    pub filename: String,
    pub sha256: String,
    pub size: i64,
    pub uploaded_at: String,
}

/// Where a book's bytes ended up after ingestion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoragePointers {
    pub pdf_public_id: Option<String>,
    pub thumbnail_public_id: Option<String>,
    pub pdf_url: Option<String>,
    pub thumbnail_path: Option<String>,
}

/// Everything the ingestion pipeline persists in one transaction
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub book_id: String,
    pub filename: String,
    pub content_text: String,
    pub sha256: String,
    pub size: i64,
    pub storage: StoragePointers,
}

/// Document repository
pub struct DocumentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DocumentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recently uploaded document of a book
    pub async fn primary(&self, book_id: &str) -> Result<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, book_id, filename, content_text, sha256, size, uploaded_at
            FROM documents
            WHERE book_id = ?
            ORDER BY uploaded_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(book_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(document)
    }

    /// All documents, newest first
    pub async fn list(&self) -> Result<Vec<DocumentSummary>> {
        let documents = sqlx::query_as::<_, DocumentSummary>(
            r#"
            SELECT id, book_id, filename, sha256, size, uploaded_at
            FROM documents
            ORDER BY uploaded_at DESC, rowid DESC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(documents)
    }

    /// Stored filenames of every document of a book
    pub async fn filenames_for_book(&self, book_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT filename FROM documents WHERE book_id = ?")
            .bind(book_id)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(|(filename,)| filename).collect())
    }

    /// Distinct ids of books with a document containing `needle`
    ///
    /// Both sides are lowercased with Unicode rules, so `émile` matches
    /// `ÉMILE`. The needle is matched literally.
    pub async fn matching_book_ids(&self, needle: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT book_id
            FROM documents
            WHERE instr(content_folded, ?) > 0
            "#,
        )
        .bind(needle.to_lowercase())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Insert the document row and repoint the owning book in one transaction
    pub async fn record_upload(&self, upload: &RecordedUpload) -> Result<Document> {
        let document = Document {
            id: Uuid::new_v4().to_string(),
            book_id: upload.book_id.clone(),
            filename: upload.filename.clone(),
            content_text: upload.content_text.clone(),
            sha256: upload.sha256.clone(),
            size: upload.size,
            uploaded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, book_id, filename, content_text, content_folded,
                                   sha256, size, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.id)
        .bind(&document.book_id)
        .bind(&document.filename)
        .bind(&document.content_text)
        .bind(document.content_text.to_lowercase())
        .bind(&document.sha256)
        .bind(document.size)
        .bind(&document.uploaded_at)
        .execute(&mut *tx)
        .await?;

        // Thumbnails keep their previous value when this upload produced none
        sqlx::query(
            r#"
            UPDATE books
            SET pdf_public_id = ?,
                pdf_url = ?,
                thumbnail_public_id = COALESCE(?, thumbnail_public_id),
                thumbnail_path = COALESCE(?, thumbnail_path),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&upload.storage.pdf_public_id)
        .bind(&upload.storage.pdf_url)
        .bind(&upload.storage.thumbnail_public_id)
        .bind(&upload.storage.thumbnail_path)
        .bind(&document.uploaded_at)
        .bind(&document.book_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(document)
    }
}
