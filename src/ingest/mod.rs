//! Document ingestion

mod pipeline;
mod sandbox;

pub use pipeline::{IncomingFile, IngestedDocument, IngestionPipeline, StagedUpload, ThumbnailReport};
pub use sandbox::{discard, resolve_document_path, sanitize_filename, storage_name, TempFile};
