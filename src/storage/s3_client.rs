//! S3-compatible blob store
//!
//! Wraps the AWS SDK for S3-compatible storage access. Every call is bounded
//! by the configured timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};

use crate::config::StorageConfig;
use crate::error::StorageError;

use super::BlobStore;

/// S3-compatible blob store
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    key_prefix: String,
    url_ttl: Duration,
    timeout: Duration,
}

impl S3BlobStore {
    /// Create a new S3 blob store from configuration
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "biblio",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO and other S3-compatible services
        }

        let client = Client::from_conf(builder.build());

        let bucket = config.bucket.clone();
        match client.head_bucket().bucket(&bucket).send().await {
            Ok(_) => {
                tracing::info!("Connected to S3 bucket: {}", bucket);
            }
            Err(e) => {
                tracing::warn!(
                    "Could not verify bucket {}: {}. Will attempt operations anyway.",
                    bucket,
                    e
                );
            }
        }

        Ok(Self {
            client,
            bucket,
            key_prefix: config.key_prefix.trim_matches('/').to_string(),
            url_ttl: Duration::from_secs(config.url_ttl_seconds),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn key_for(&self, name: &str) -> String {
        if self.key_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.key_prefix, name)
        }
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| StorageError::Timeout(self.timeout.as_secs()))?
    }

    async fn put(&self, data: Vec<u8>, name: &str, content_type: &str) -> Result<String, StorageError> {
        let key = self.key_for(name);
        let size = data.len();

        self.bounded(async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(ByteStream::from(data))
                .content_type(content_type)
                .send()
                .await
                .map_err(|e| StorageError::UploadFailed {
                    key: key.clone(),
                    message: e.to_string(),
                })
        })
        .await?;

        tracing::debug!(key = %key, bytes = size, "Stored object");
        Ok(key)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload_raw(&self, data: Vec<u8>, name: &str) -> Result<String, StorageError> {
        self.put(data, name, "application/pdf").await
    }

    async fn upload_image(&self, data: Vec<u8>, name: &str) -> Result<String, StorageError> {
        self.put(data, name, "image/jpeg").await
    }

    async fn signed_url(&self, public_id: &str) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(self.url_ttl)
            .map_err(|e| StorageError::SdkError(format!("Invalid presign lifetime: {}", e)))?;

        let request = self
            .bounded(async {
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(public_id)
                    .presigned(presigning)
                    .await
                    .map_err(|e| {
                        StorageError::SdkError(format!("Failed to presign {}: {}", public_id, e))
                    })
            })
            .await?;

        Ok(request.uri().to_string())
    }

    async fn delete(&self, public_id: &str) -> Result<bool, StorageError> {
        self.bounded(async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(public_id)
                .send()
                .await
                .map_err(|e| {
                    if e.to_string().contains("404") || e.to_string().contains("NoSuchKey") {
                        StorageError::ObjectNotFound(public_id.to_string())
                    } else {
                        StorageError::SdkError(format!("Failed to delete {}: {}", public_id, e))
                    }
                })
        })
        .await
        .map(|_| true)
        .or_else(|e| match e {
            StorageError::ObjectNotFound(_) => Ok(false),
            other => Err(other),
        })
    }
}
