//! Storage module for remote blob backends
//!
//! The ingestion pipeline and the streaming responder only see the
//! [`BlobStore`] trait; `S3BlobStore` is the production backend (MinIO, R2,
//! B2 and AWS S3 all work through it).

mod blob;
mod s3_client;

pub use blob::{pdf_object_name, thumbnail_object_name, BlobStore};
pub use s3_client::S3BlobStore;
