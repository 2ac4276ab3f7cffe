//! Document API endpoints
//!
//! - POST /documents/upload - multipart `book_id` + `file` (admin)
//! - GET /documents - every uploaded document (admin)
//! - GET /documents/search?query= - books whose text contains the query
//! - POST /documents/regenerate_thumbnails - rebuild local thumbnails (admin)

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AdminUser;
use crate::db::{Book, DocumentRepository, DocumentSummary};
use crate::error::{AppError, Result};
use crate::ingest::{IncomingFile, IngestedDocument, StagedUpload, ThumbnailReport};
use crate::state::AppState;

/// Upload response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub document_id: String,
    pub book_id: String,
    pub filename: String,
    pub sha256: String,
    pub size: i64,
    pub uploaded_at: String,
    pub thumbnail_public_id: Option<String>,
    pub thumbnail_path: Option<String>,
}

impl From<IngestedDocument> for UploadResponse {
    fn from(ingested: IngestedDocument) -> Self {
        let IngestedDocument { document, storage } = ingested;
        UploadResponse {
            document_id: document.id,
            book_id: document.book_id,
            filename: document.filename,
            sha256: document.sha256,
            size: document.size,
            uploaded_at: document.uploaded_at,
            thumbnail_public_id: storage.thumbnail_public_id,
            thumbnail_path: storage.thumbnail_path,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct RegenerateQuery {
    #[serde(default = "default_only_missing")]
    pub only_missing: bool,
    pub limit: Option<i64>,
}

fn default_only_missing() -> bool {
    true
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_documents))
        .route("/search", get(search_documents))
        .route("/regenerate_thumbnails", post(regenerate_thumbnails))
        // The ingestion pipeline enforces its own ceiling while streaming
        .route("/upload", post(upload_document).layer(DefaultBodyLimit::disable()))
}

/// POST /documents/upload
///
/// `book_id` and `file` may arrive in either order. A file that arrives
/// first is staged in the sandbox until its book id is known.
async fn upload_document(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let mut book_id: Option<String> = None;
    let mut staged: Option<StagedUpload> = None;
    let mut ingested: Option<IngestedDocument> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "book_id" | "bookId" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Invalid book_id field: {}", e)))?
                    .trim()
                    .to_string();

                if let Some(pending) = staged.take() {
                    ingested = Some(state.ingestion().ingest_staged(&value, pending).await?);
                }
                book_id = Some(value);
            }
            "file" => {
                if ingested.is_some() || staged.is_some() {
                    return Err(AppError::InvalidInput("Only one file may be uploaded".to_string()));
                }

                let incoming = IncomingFile {
                    filename: field.file_name().unwrap_or("document.pdf").to_string(),
                    content_type: field.content_type().map(|s| s.to_string()),
                };
                tracing::debug!(
                    filename = %incoming.filename,
                    content_type = ?incoming.content_type,
                    "Receiving upload"
                );

                match &book_id {
                    Some(id) => ingested = Some(state.ingestion().ingest(id, incoming, field).await?),
                    None => staged = Some(state.ingestion().receive(incoming, field).await?),
                }
            }
            other => {
                tracing::debug!(field = %other, "Ignoring multipart field");
            }
        }
    }

    let ingested = match (ingested, staged) {
        (Some(ingested), _) => ingested,
        (None, Some(_)) => return Err(AppError::InvalidInput("book_id is required".to_string())),
        (None, None) => return Err(AppError::InvalidInput("file is required".to_string())),
    };

    tracing::info!(
        user_id = %user.id,
        book_id = %ingested.document.book_id,
        document_id = %ingested.document.id,
        "Document uploaded"
    );

    Ok((StatusCode::CREATED, Json(ingested.into())))
}

/// GET /documents
async fn list_documents(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<DocumentSummary>>> {
    let documents = DocumentRepository::new(state.db()).list().await?;
    Ok(Json(documents))
}

/// GET /documents/search?query=
async fn search_documents(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<Book>>> {
    let books = state.search().search(&params.query).await?;
    Ok(Json(books))
}

/// POST /documents/regenerate_thumbnails?only_missing=&limit=
async fn regenerate_thumbnails(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<RegenerateQuery>,
) -> Result<Json<ThumbnailReport>> {
    let limit = params.limit.filter(|n| *n > 0);
    let report = state
        .ingestion()
        .regenerate_thumbnails(params.only_missing, limit)
        .await?;
    Ok(Json(report))
}
