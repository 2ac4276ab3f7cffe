//! Shared integration test support
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Path as UrlPath, State},
    http::{header, Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tempfile::TempDir;
use tower::ServiceExt;

use biblio_server::auth::Role;
use biblio_server::config::{AuthConfig, Config, DatabaseConfig, ServerConfig, UploadConfig};
use biblio_server::db::{create_memory_pool, Book, BookRepository, Language, NewBook};
use biblio_server::error::StorageError;
use biblio_server::pdf::{MupdfTextExtractor, MupdfThumbnailer, PdfError, ThumbnailGenerator};
use biblio_server::storage::BlobStore;
use biblio_server::{app, AppState};

pub const TEST_SECRET: &str = "integration-test-secret";

/// Single-page PDF showing `text` in Helvetica
pub fn pdf_with_text(text: &str) -> Vec<u8> {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)");
    let content = format!("BT /F1 24 Tf 72 720 Td ({}) Tj ET", escaped);

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", index + 1, body).as_bytes());
    }

    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

/// Valid PDF padded with trailing whitespace to exactly `len` bytes
pub fn pdf_of_len(text: &str, len: usize) -> Vec<u8> {
    let mut pdf = pdf_with_text(text);
    assert!(pdf.len() <= len, "base PDF is {} bytes", pdf.len());
    pdf.resize(len, b'\n');
    pdf
}

/// Blob store backed by memory and served over a real local HTTP listener,
/// so signed URLs can be fetched like remote ones
#[derive(Clone)]
pub struct MemoryBlobStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    base_url: String,
}

async fn serve_object(
    State(objects): State<Arc<Mutex<HashMap<String, Vec<u8>>>>>,
    UrlPath(key): UrlPath<String>,
) -> axum::response::Response {
    let found = objects.lock().unwrap().get(&key).cloned();
    match found {
        Some(bytes) => bytes.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

impl MemoryBlobStore {
    pub async fn start() -> Self {
        let objects: Arc<Mutex<HashMap<String, Vec<u8>>>> = Arc::default();
        let router = Router::new()
            .route("/objects/*key", get(serve_object))
            .with_state(objects.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            objects,
            base_url: format!("http://{}", addr),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn remove(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }

    fn put(&self, data: Vec<u8>, name: &str) -> String {
        let key = format!("biblio/{}", name);
        self.objects.lock().unwrap().insert(key.clone(), data);
        key
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload_raw(&self, data: Vec<u8>, name: &str) -> Result<String, StorageError> {
        Ok(self.put(data, name))
    }

    async fn upload_image(&self, data: Vec<u8>, name: &str) -> Result<String, StorageError> {
        Ok(self.put(data, name))
    }

    async fn signed_url(&self, public_id: &str) -> Result<String, StorageError> {
        Ok(format!("{}/objects/{}", self.base_url, public_id))
    }

    async fn delete(&self, public_id: &str) -> Result<bool, StorageError> {
        Ok(self.objects.lock().unwrap().remove(public_id).is_some())
    }
}

/// Blob store whose raw uploads always fail
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn upload_raw(&self, _data: Vec<u8>, name: &str) -> Result<String, StorageError> {
        Err(StorageError::UploadFailed {
            key: name.to_string(),
            message: "service unavailable".to_string(),
        })
    }

    async fn upload_image(&self, _data: Vec<u8>, name: &str) -> Result<String, StorageError> {
        Ok(name.to_string())
    }

    async fn signed_url(&self, public_id: &str) -> Result<String, StorageError> {
        Err(StorageError::ObjectNotFound(public_id.to_string()))
    }

    async fn delete(&self, _public_id: &str) -> Result<bool, StorageError> {
        Ok(false)
    }
}

/// Thumbnailer standing in for a missing rasterizer
pub struct BrokenThumbnailer;

#[async_trait]
impl ThumbnailGenerator for BrokenThumbnailer {
    async fn generate(&self, _path: &Path) -> Result<Vec<u8>, PdfError> {
        Err(PdfError::LoadError("rasterizer not installed".to_string()))
    }
}

pub struct TestAppBuilder {
    max_bytes: u64,
    blob_store: Option<Arc<dyn BlobStore>>,
    thumbnailer: Option<Arc<dyn ThumbnailGenerator>>,
}

impl TestAppBuilder {
    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    pub fn thumbnailer(mut self, thumbnailer: Arc<dyn ThumbnailGenerator>) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self
    }

    pub async fn build(self) -> TestApp {
        let dir = TempDir::new().unwrap();
        let upload = UploadConfig {
            dir: dir.path().to_path_buf(),
            max_bytes: self.max_bytes,
            ..UploadConfig::default()
        };
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
            },
            upload: upload.clone(),
            auth: AuthConfig::new(TEST_SECRET),
            storage: None,
        };

        let pool = create_memory_pool().await.unwrap();
        let thumbnailer = self
            .thumbnailer
            .unwrap_or_else(|| Arc::new(MupdfThumbnailer::new(upload.thumbnail_size)));
        let state = AppState::with_processors(
            config,
            pool,
            self.blob_store,
            Arc::new(MupdfTextExtractor),
            thumbnailer,
        );

        let admin_token = state.tokens().issue_access_token("admin-1", Role::Admin).unwrap();
        let user_token = state.tokens().issue_access_token("user-1", Role::User).unwrap();

        TestApp {
            router: app(state.clone()),
            state,
            dir,
            admin_token,
            user_token,
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub dir: TempDir,
    pub admin_token: String,
    pub user_token: String,
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            max_bytes: 60 * 1024 * 1024,
            blob_store: None,
            thumbnailer: None,
        }
    }

    pub async fn create_book(&self, title: &str) -> Book {
        BookRepository::new(self.state.db())
            .create(&NewBook {
                title: title.to_string(),
                author: "Test Author".to_string(),
                category: "Testing".to_string(),
                language: Language::En,
                tags: vec!["test".to_string()],
                description: None,
                cover_image_url: None,
            })
            .await
            .unwrap()
    }

    pub async fn book(&self, id: &str) -> Book {
        BookRepository::new(self.state.db()).get(id).await.unwrap().unwrap()
    }

    /// Regular files left in the upload sandbox (the thumbnails subdirectory
    /// is not included)
    pub fn sandbox_files(&self) -> Vec<String> {
        let mut files: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        files
    }

    /// POST /documents/upload through the router
    pub async fn upload(&self, parts: &[Part], token: Option<&str>) -> (StatusCode, serde_json::Value) {
        let (content_type, body) = multipart_body(parts);

        let mut request = Request::builder()
            .method("POST")
            .uri("/documents/upload")
            .header(header::CONTENT_TYPE, content_type);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = self
            .router
            .clone()
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    /// Upload `pdf` for `book_id` as admin, expecting success
    pub async fn upload_pdf(&self, book_id: &str, pdf: Vec<u8>) -> serde_json::Value {
        let (status, json) = self
            .upload(
                &[
                    Part::text("book_id", book_id),
                    Part::file("file", "book.pdf", "application/pdf", pdf),
                ],
                Some(&self.admin_token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "upload failed: {}", json);
        json
    }
}

pub enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        content_type: String,
        data: Vec<u8>,
    },
}

impl Part {
    pub fn text(name: &str, value: &str) -> Self {
        Part::Text {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn file(name: &str, filename: &str, content_type: &str, data: Vec<u8>) -> Self {
        Part::File {
            name: name.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            data,
        }
    }
}

const BOUNDARY: &str = "biblio-test-boundary-7MA4YWxkTrZu0gW";

/// Encode `parts` as multipart/form-data, returning the content type and body
pub fn multipart_body(parts: &[Part]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}
