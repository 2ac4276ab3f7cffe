//! Upload sandbox: deterministic storage names, temp-file ownership and
//! confined path resolution

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::error::{AppError, Result};

const DEFAULT_FILENAME: &str = "document.pdf";

/// Replace every run of characters outside `[A-Za-z0-9_.-]` with `_`
///
/// Only the final path segment of `original` is kept.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_FILENAME);

    let mut sanitized = String::with_capacity(base.len());
    let mut in_run = false;
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            sanitized.push(c);
            in_run = false;
        } else if !in_run {
            sanitized.push('_');
            in_run = true;
        }
    }
    sanitized
}

/// Deterministic sandbox name for a book's upload
pub fn storage_name(book_id: &str, original: &str) -> String {
    format!("{}_{}", book_id, sanitize_filename(original))
}

/// Sandbox name an upload is written under until it has been accepted
///
/// Kept apart from the stored name so a rejected upload never touches the
/// copy a previous upload left behind.
pub fn partial_name(book_id: &str, original: &str) -> String {
    format!(".{}.part", storage_name(book_id, original))
}

/// Owned file in the sandbox, removed when dropped unless kept
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the file, keeping ownership of it under the new name
    pub async fn rename(&mut self, to: PathBuf) -> Result<()> {
        tokio::fs::rename(&self.path, &to).await?;
        self.path = to;
        Ok(())
    }

    /// Give up ownership; the file stays on disk
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Remove the file now
    pub async fn remove(mut self) -> Result<()> {
        self.armed = false;
        discard(&self.path).await
    }

    /// Move the file back to `to` and give up ownership. If the move fails
    /// the file stays where it is.
    pub async fn restore(mut self, to: PathBuf) {
        if let Err(e) = self.rename(to).await {
            tracing::warn!(path = %self.path.display(), "Failed to restore file: {}", e);
        }
        self.keep();
    }
}

/// Move an existing file out of the way so `path` can be replaced
///
/// The guard owns the old copy: `restore` puts it back, dropping it deletes
/// it. `None` when there was nothing at `path`.
pub async fn set_aside(path: &Path) -> Result<Option<TempFile>> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let aside = path.with_file_name(format!(".{}.previous-{}", name, Uuid::new_v4()));

    match tokio::fs::rename(path, &aside).await {
        Ok(()) => Ok(Some(TempFile::new(aside))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), "Failed to remove temp file: {}", e);
                }
            }
        }
    }
}

/// Delete a file; a file that is already gone is not an error
pub async fn discard(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Absolute path of a stored document, confined to `dir`
///
/// Names that would leave the sandbox are `InvalidInput`; a name that stays
/// inside but has no file behind it is `NotFound`.
pub async fn resolve_document_path(dir: &Path, filename: &str) -> Result<PathBuf> {
    let relative = Path::new(filename);
    if filename.is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(AppError::InvalidInput(
            "Document path escapes upload directory".to_string(),
        ));
    }

    let root = match tokio::fs::canonicalize(dir).await {
        Ok(root) => root,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AppError::NotFound("Document file not found".to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let candidate = match tokio::fs::canonicalize(root.join(relative)).await {
        Ok(candidate) => candidate,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AppError::NotFound("Document file not found".to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    // Symlinks inside the sandbox may still point out of it
    if !candidate.starts_with(&root) {
        return Err(AppError::InvalidInput(
            "Document path escapes upload directory".to_string(),
        ));
    }

    Ok(candidate)
}
