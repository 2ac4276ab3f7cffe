//! Configuration management for Biblio Server
//!
//! Built once in `main` and handed to `AppState`; nothing in the core reads
//! the environment after startup.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Default upload ceiling: 60 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 60 * 1024 * 1024;

/// Default stream token lifetime
pub const DEFAULT_STREAM_TOKEN_TTL_SECONDS: i64 = 300;

/// Default general access token lifetime (one day)
pub const DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 60 * 24;

/// Default bound on a single blob store call
pub const DEFAULT_BLOB_TIMEOUT_SECONDS: u64 = 30;

/// Default thumbnail bounding box in pixels
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 512;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
    pub auth: AuthConfig,
    /// Remote object storage; `None` runs the server in local storage mode
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Sandbox directory for in-flight and locally stored documents
    pub dir: PathBuf,
    pub max_bytes: u64,
    pub generate_thumbnails: bool,
    pub thumbnail_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub stream_token_ttl_seconds: i64,
    pub access_token_expire_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    pub key_prefix: String,
    pub url_ttl_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            dir: PathBuf::from("./uploads"),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            generate_thumbnails: true,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
        }
    }
}

impl Config {
    /// Bound applied to each blob store call, including proxied downloads
    pub fn blob_timeout(&self) -> std::time::Duration {
        let seconds = self
            .storage
            .as_ref()
            .map(|s| s.timeout_seconds)
            .unwrap_or(DEFAULT_BLOB_TIMEOUT_SECONDS);
        std::time::Duration::from_secs(seconds)
    }
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        AuthConfig {
            jwt_secret: jwt_secret.into(),
            stream_token_ttl_seconds: DEFAULT_STREAM_TOKEN_TTL_SECONDS,
            access_token_expire_minutes: DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("JWT_SECRET_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET_KEY"))?;

        let storage = match env::var("S3_BUCKET").ok().filter(|s| !s.is_empty()) {
            Some(bucket) => Some(StorageConfig {
                endpoint: env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
                bucket,
                access_key: env::var("S3_ACCESS_KEY").map_err(|_| ConfigError::Missing("S3_ACCESS_KEY"))?,
                secret_key: env::var("S3_SECRET_KEY").map_err(|_| ConfigError::Missing("S3_SECRET_KEY"))?,
                region: env::var("S3_REGION").ok(),
                key_prefix: env::var("S3_KEY_PREFIX").unwrap_or_else(|_| "biblio".to_string()),
                url_ttl_seconds: parse_var("BLOB_URL_TTL_SECONDS", 3600),
                timeout_seconds: parse_var("BLOB_TIMEOUT_SECONDS", DEFAULT_BLOB_TIMEOUT_SECONDS),
            }),
            None => None,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3000),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./biblio.db".to_string()),
            },
            upload: UploadConfig {
                dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./uploads")),
                max_bytes: parse_var("PDF_UPLOAD_MAX_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
                generate_thumbnails: env::var("GENERATE_THUMBNAILS_ON_UPLOAD")
                    .map(|raw| parse_flag(&raw))
                    .unwrap_or(true),
                thumbnail_size: parse_var("THUMBNAIL_SIZE", DEFAULT_THUMBNAIL_SIZE),
            },
            auth: AuthConfig {
                jwt_secret,
                stream_token_ttl_seconds: parse_var(
                    "DOCUMENT_STREAM_TOKEN_TTL_SECONDS",
                    DEFAULT_STREAM_TOKEN_TTL_SECONDS,
                ),
                access_token_expire_minutes: parse_var(
                    "ACCESS_TOKEN_EXPIRE_MINUTES",
                    DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES,
                ),
            },
            storage,
        })
    }
}

/// Read a numeric variable, falling back to `default` when unset or invalid
fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {:?}, using {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(parse_flag("on"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_upload_defaults() {
        let upload = UploadConfig::default();
        assert_eq!(upload.max_bytes, 60 * 1024 * 1024);
        assert_eq!(upload.thumbnail_size, 512);
        assert!(upload.generate_thumbnails);
    }

    #[test]
    fn test_auth_defaults() {
        let auth = AuthConfig::new("secret");
        assert_eq!(auth.stream_token_ttl_seconds, 300);
        assert_eq!(auth.access_token_expire_minutes, 1440);
    }
}
