//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::JwtTokens;
use crate::config::Config;
use crate::ingest::IngestionPipeline;
use crate::pdf::{MupdfTextExtractor, MupdfThumbnailer, TextExtractor, ThumbnailGenerator};
use crate::search::SearchIndex;
use crate::storage::BlobStore;
use crate::streaming::DocumentStreamer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    blob_store: Option<Arc<dyn BlobStore>>,
    tokens: Arc<JwtTokens>,
    ingestion: IngestionPipeline,
    streamer: DocumentStreamer,
    search: SearchIndex,
}

impl AppState {
    /// Create the state with the MuPDF-backed PDF processors
    pub fn new(config: Config, db: SqlitePool, blob_store: Option<Arc<dyn BlobStore>>) -> Self {
        let thumbnailer = MupdfThumbnailer::new(config.upload.thumbnail_size);
        Self::with_processors(
            config,
            db,
            blob_store,
            Arc::new(MupdfTextExtractor),
            Arc::new(thumbnailer),
        )
    }

    pub fn with_processors(
        config: Config,
        db: SqlitePool,
        blob_store: Option<Arc<dyn BlobStore>>,
        extractor: Arc<dyn TextExtractor>,
        thumbnailer: Arc<dyn ThumbnailGenerator>,
    ) -> Self {
        let tokens = Arc::new(JwtTokens::new(&config.auth));

        let ingestion = IngestionPipeline::new(
            db.clone(),
            config.upload.clone(),
            blob_store.clone(),
            extractor,
            thumbnailer,
        );
        let streamer = DocumentStreamer::new(
            db.clone(),
            config.upload.dir.clone(),
            blob_store.clone(),
            tokens.clone(),
            config.blob_timeout(),
        );
        let search = SearchIndex::new(db.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                blob_store,
                tokens,
                ingestion,
                streamer,
                search,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Remote blob store, absent in local storage mode
    pub fn blob_store(&self) -> Option<&Arc<dyn BlobStore>> {
        self.inner.blob_store.as_ref()
    }

    pub fn tokens(&self) -> &JwtTokens {
        &self.inner.tokens
    }

    pub fn ingestion(&self) -> &IngestionPipeline {
        &self.inner.ingestion
    }

    pub fn streamer(&self) -> &DocumentStreamer {
        &self.inner.streamer
    }

    pub fn search(&self) -> &SearchIndex {
        &self.inner.search
    }
}
