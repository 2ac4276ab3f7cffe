//! Biblio Server Library
//!
//! Library document backend: PDF ingestion with text extraction and
//! thumbnails, substring search over the extracted text, and token-gated
//! streaming of stored documents from S3-compatible storage or local disk.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod pdf;
pub mod routes;
pub mod search;
pub mod state;
pub mod storage;
pub mod streaming;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;

/// Build the HTTP application
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", routes::health::router())
        .nest("/documents", routes::documents::router())
        .nest("/books", routes::books::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
