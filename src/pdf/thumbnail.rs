use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use mupdf::{Colorspace, Matrix};

use super::{open_document, PdfError};

const JPEG_QUALITY: u8 = 85;

/// Renders a PDF's first page to a JPEG
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    async fn generate(&self, path: &Path) -> Result<Vec<u8>, PdfError>;
}

/// MuPDF-backed thumbnailer fitting the first page into a square box
#[derive(Debug, Clone, Copy)]
pub struct MupdfThumbnailer {
    max_size: u32,
}

impl MupdfThumbnailer {
    pub fn new(max_size: u32) -> Self {
        Self { max_size: max_size.max(1) }
    }

    fn render_blocking(path: &Path, max_size: u32) -> Result<Vec<u8>, PdfError> {
        let doc = open_document(path)?;
        if doc.page_count()? < 1 {
            return Err(PdfError::Empty);
        }

        let page = doc.load_page(0)?;
        let bounds = page.bounds()?;

        let width = bounds.x1 - bounds.x0;
        let height = bounds.y1 - bounds.y0;
        let scale = (max_size as f32) / width.max(height).max(1.0);

        let matrix = Matrix::new_scale(scale, scale);
        let colorspace = Colorspace::device_rgb();
        let pixmap = page.to_pixmap(&matrix, &colorspace, false, false)?;

        encode_jpeg(&pixmap)
    }
}

#[async_trait]
impl ThumbnailGenerator for MupdfThumbnailer {
    async fn generate(&self, path: &Path) -> Result<Vec<u8>, PdfError> {
        let path: PathBuf = path.to_path_buf();
        let max_size = self.max_size;
        tokio::task::spawn_blocking(move || Self::render_blocking(&path, max_size)).await?
    }
}

/// JPEG has no alpha channel, so samples are packed as plain RGB
fn encode_jpeg(pixmap: &mupdf::Pixmap) -> Result<Vec<u8>, PdfError> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(0);
            let g = samples.get(offset + 1).copied().unwrap_or(r);
            let b = samples.get(offset + 2).copied().unwrap_or(r);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }

    let img = image::RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| PdfError::ImageError("Failed to create image buffer".to_string()))?;

    let mut output = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_with_encoder(JpegEncoder::new_with_quality(
            &mut Cursor::new(&mut output),
            JPEG_QUALITY,
        ))
        .map_err(|e| PdfError::ImageError(e.to_string()))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_floor() {
        assert_eq!(MupdfThumbnailer::new(0).max_size, 1);
        assert_eq!(MupdfThumbnailer::new(512).max_size, 512);
    }

    #[tokio::test]
    async fn test_unreadable_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4 truncated").unwrap();

        assert!(MupdfThumbnailer::new(64).generate(&path).await.is_err());
    }
}
