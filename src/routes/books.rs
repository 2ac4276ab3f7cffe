//! Book API endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AdminUser, AuthUser};
use crate::db::{Book, BookRepository, DocumentRepository, NewBook};
use crate::error::{AppError, Result, TokenRejection};
use crate::ingest::{discard, resolve_document_path};
use crate::state::AppState;

/// Stream token response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub ttl_seconds: i64,
    pub stream_endpoint: String,
    pub stream_url: String,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_book))
        .route("/:id", get(get_book).delete(delete_book))
        .route("/:id/thumbnail", get(get_thumbnail))
        .route("/:id/stream-token", post(create_stream_token))
        .route("/:id/stream", get(stream_book))
}

async fn find_book(state: &AppState, id: &str) -> Result<Book> {
    BookRepository::new(state.db())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
}

/// POST /books
async fn create_book(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(new_book): Json<NewBook>,
) -> Result<(StatusCode, Json<Book>)> {
    if new_book.title.trim().is_empty() || new_book.author.trim().is_empty() {
        return Err(AppError::InvalidInput("title and author are required".to_string()));
    }

    let book = BookRepository::new(state.db()).create(&new_book).await?;
    tracing::info!(book_id = %book.id, category = %book.category, "Book created");

    Ok((StatusCode::CREATED, Json(book)))
}

/// GET /books/:id
async fn get_book(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Book>> {
    Ok(Json(find_book(&state, &id).await?))
}

/// DELETE /books/:id
///
/// Stored files and remote objects are cleaned up best-effort after the row
/// is gone.
async fn delete_book(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let book = find_book(&state, &id).await?;
    let filenames = DocumentRepository::new(state.db())
        .filenames_for_book(&id)
        .await?;

    BookRepository::new(state.db()).delete(&id).await?;

    let upload_dir = &state.config().upload.dir;
    for filename in filenames {
        if let Ok(path) = resolve_document_path(upload_dir, &filename).await {
            if let Err(e) = discard(&path).await {
                tracing::warn!(book_id = %id, path = %path.display(), "Failed to remove stored document: {}", e);
            }
        }
    }
    if let Err(e) = discard(&state.ingestion().local_thumbnail_path(&id)).await {
        tracing::warn!(book_id = %id, "Failed to remove thumbnail: {}", e);
    }

    if let Some(store) = state.blob_store() {
        for public_id in [book.pdf_public_id, book.thumbnail_public_id].into_iter().flatten() {
            if let Err(e) = store.delete(&public_id).await {
                tracing::warn!(book_id = %id, public_id = %public_id, "Failed to delete remote object: {}", e);
            }
        }
    }

    tracing::info!(book_id = %id, "Book deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /books/:id/thumbnail
async fn get_thumbnail(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let book = find_book(&state, &id).await?;

    if let (Some(public_id), Some(store)) = (&book.thumbnail_public_id, state.blob_store()) {
        let url = store.signed_url(public_id).await?;
        return Ok(Redirect::temporary(&url).into_response());
    }

    if book.thumbnail_path.is_some() {
        match tokio::fs::read(state.ingestion().local_thumbnail_path(&id)).await {
            Ok(bytes) => return Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::NotFound(format!("Book {} has no thumbnail", id)))
}

/// POST /books/:id/stream-token
async fn create_stream_token(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<StreamTokenResponse>> {
    let issued = state.streamer().issue_token(&id, &user.id).await?;

    let stream_endpoint = format!("/books/{}/stream", id);
    let stream_url = format!("{}?token={}", stream_endpoint, urlencoding::encode(&issued.token));

    Ok(Json(StreamTokenResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        ttl_seconds: issued.ttl_seconds,
        stream_endpoint,
        stream_url,
    }))
}

/// GET /books/:id/stream?token=
async fn stream_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<StreamQuery>,
) -> Result<Response> {
    let token = params.token.unwrap_or_default();
    if token.is_empty() {
        // Book existence is still reported first
        find_book(&state, &id).await?;
        return Err(TokenRejection::Malformed.into());
    }

    let (stream, _claims) = state.streamer().open(&id, &token).await?;
    Ok(stream.into_response())
}
