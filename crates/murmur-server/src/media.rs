//! Content-addressed image storage.
//!
//! Images arrive as base64 (optionally wrapped in a `data:` URL), are sniffed
//! for a supported format, and written once under `<blake3>.<ext>`. Storing
//! the same bytes twice yields the same URL.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::fs;
use tracing::{debug, info};

use crate::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageKind {
    /// Detect the format from magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageKind::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageKind::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(ImageKind::Gif)
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(ImageKind::Webp)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::Gif => "gif",
            ImageKind::Webp => "webp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Gif => "image/gif",
            ImageKind::Webp => "image/webp",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "png" => Some(ImageKind::Png),
            "jpg" => Some(ImageKind::Jpeg),
            "gif" => Some(ImageKind::Gif),
            "webp" => Some(ImageKind::Webp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    base_path: PathBuf,
    max_size: usize,
    public_base_url: String,
}

impl MediaStore {
    pub async fn new(
        base_path: PathBuf,
        max_size: usize,
        public_base_url: impl Into<String>,
    ) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::MediaStorage(format!(
                "Failed to create media directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Media store initialized");

        Ok(Self {
            base_path,
            max_size,
            public_base_url: public_base_url.into(),
        })
    }

    /// Decode, validate and persist an image. Returns its public URL.
    pub async fn store_base64(&self, raw: &str) -> Result<String, ServerError> {
        let data = self.decode(raw)?;
        let kind = ImageKind::sniff(&data)
            .ok_or_else(|| ServerError::BadRequest("Unsupported image type".to_string()))?;

        let name = format!("{}.{}", blake3::hash(&data).to_hex(), kind.extension());
        let path = self.base_path.join(&name);

        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!(name = %name, "Image already stored");
        } else {
            fs::write(&path, &data).await.map_err(|e| {
                ServerError::MediaStorage(format!("Failed to write image {}: {}", name, e))
            })?;
            debug!(name = %name, size = data.len(), "Stored image");
        }

        Ok(self.url_for(&name))
    }

    /// Read a stored image by file name. Returns the bytes and content type.
    pub async fn get(&self, name: &str) -> Result<(Vec<u8>, &'static str), ServerError> {
        let kind = parse_name(name)
            .ok_or_else(|| ServerError::NotFound("Image not found".to_string()))?;

        let data = fs::read(self.base_path.join(name)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ServerError::NotFound("Image not found".to_string())
            } else {
                ServerError::MediaStorage(format!("Failed to read image {}: {}", name, e))
            }
        })?;

        Ok((data, kind.content_type()))
    }

    pub fn url_for(&self, name: &str) -> String {
        format!("{}/media/{}", self.public_base_url, name)
    }

    fn decode(&self, raw: &str) -> Result<Vec<u8>, ServerError> {
        let payload = match raw.trim().strip_prefix("data:") {
            Some(rest) => {
                let (_, body) = rest
                    .split_once(";base64,")
                    .ok_or_else(|| ServerError::BadRequest("Invalid image data".to_string()))?;
                body
            }
            None => raw.trim(),
        };

        // Cheap upper bound before allocating the decoded buffer.
        let estimated = payload.len() / 4 * 3;
        if estimated > self.max_size + 3 {
            return Err(ServerError::ImageTooLarge {
                size: estimated,
                max: self.max_size,
            });
        }

        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let data = STANDARD
            .decode(compact)
            .map_err(|_| ServerError::BadRequest("Invalid image data".to_string()))?;

        if data.is_empty() {
            return Err(ServerError::BadRequest("Invalid image data".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::ImageTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }
        Ok(data)
    }
}

// Accept only `<64 hex>.<known ext>` so a name can never leave the media dir.
fn parse_name(name: &str) -> Option<ImageKind> {
    let (stem, ext) = name.split_once('.')?;
    if stem.len() != 64 || !stem.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    ImageKind::from_extension(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    async fn store(dir: &tempfile::TempDir, max: usize) -> MediaStore {
        MediaStore::new(dir.path().join("media"), max, "http://localhost:5000")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let media = store(&dir, 1024).await;

        let url = media.store_base64(&STANDARD.encode(PNG)).await.unwrap();
        assert!(url.starts_with("http://localhost:5000/media/"));
        assert!(url.ends_with(".png"));

        let name = url.rsplit('/').next().unwrap();
        let (data, content_type) = media.get(name).await.unwrap();
        assert_eq!(data, PNG);
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn test_data_url_and_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let media = store(&dir, 1024).await;

        let plain = media.store_base64(&STANDARD.encode(PNG)).await.unwrap();
        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(PNG));
        assert_eq!(media.store_base64(&data_url).await.unwrap(), plain);
    }

    #[tokio::test]
    async fn test_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let media = store(&dir, 1024).await;

        let err = media
            .store_base64(&STANDARD.encode(b"#!/bin/sh\necho hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));

        let err = media.store_base64("not base64 at all!").await.unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_rejects_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let media = store(&dir, 8).await;

        let err = media.store_base64(&STANDARD.encode(PNG)).await.unwrap_err();
        assert!(matches!(err, ServerError::ImageTooLarge { max: 8, .. }));
    }

    #[tokio::test]
    async fn test_get_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let media = store(&dir, 1024).await;

        let wrong_ext = format!("{}.exe", "a".repeat(64));
        for name in ["../secret.png", "abc.png", wrong_ext.as_str()] {
            assert!(matches!(
                media.get(name).await,
                Err(ServerError::NotFound(_))
            ));
        }
    }

    #[test]
    fn test_sniff() {
        assert_eq!(ImageKind::sniff(PNG), Some(ImageKind::Png));
        assert_eq!(ImageKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(b"GIF89a..."), Some(ImageKind::Gif));
        assert_eq!(ImageKind::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageKind::Webp));
        assert_eq!(ImageKind::sniff(b"hello"), None);
    }
}
