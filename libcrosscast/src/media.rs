//! Images attached to a post
//!
//! Media is read once per run, with its MIME type resolved from the file
//! extension first and from the leading bytes of the content second.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};

/// Supported image MIME types for attachments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Guess the MIME type from the extension of a path or URL
    pub fn from_path(path: &str) -> Option<Self> {
        mime_guess::from_path(path)
            .iter()
            .find_map(|mime| Self::from_mime_str(mime.essence_str()))
    }

    /// Detect the MIME type from the magic bytes at the start of the content
    pub fn sniff(content: &[u8]) -> Option<Self> {
        match content {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n', ..] => Some(Self::Png),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::WebP),
            _ => None,
        }
    }

    /// Resolve by extension, falling back to content sniffing
    pub fn resolve(path: &str, content: &[u8]) -> Option<Self> {
        Self::from_path(path).or_else(|| Self::sniff(content))
    }

    /// Get the MIME type string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// Get the typical file extension for this MIME type
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An image ready to be uploaded
#[derive(Debug, Clone, PartialEq)]
pub struct Media {
    source_path: Option<PathBuf>,
    bytes: Vec<u8>,
    mime_type: ImageMimeType,
    alt_text: Option<String>,
}

impl Media {
    pub fn new(
        source_path: Option<PathBuf>,
        bytes: Vec<u8>,
        mime_type: ImageMimeType,
        alt_text: Option<String>,
    ) -> Self {
        Self {
            source_path,
            bytes,
            mime_type,
            alt_text: clean_alt_text(alt_text),
        }
    }

    /// Build media from downloaded bytes (e.g. a link card thumbnail)
    ///
    /// `name` is only used as an extension hint; it can be a URL.
    pub fn from_bytes(name: &str, bytes: Vec<u8>, alt_text: Option<String>) -> Result<Self> {
        let mime_type = ImageMimeType::resolve(name, &bytes)
            .ok_or_else(|| ValidationError::UnknownMimeType(name.to_string()))?;
        Ok(Self::new(None, bytes, mime_type, alt_text))
    }

    /// Read an image from disk
    ///
    /// Fails when the file cannot be read, when its type cannot be resolved,
    /// or when it is larger than `size_limit` bytes.
    pub async fn load(
        path: impl AsRef<Path>,
        alt_text: Option<String>,
        size_limit: Option<u64>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let unreadable = |source| ValidationError::UnreadableImage {
            path: path.to_path_buf(),
            source,
        };

        let metadata = tokio::fs::metadata(path).await.map_err(unreadable)?;
        if let Some(limit) = size_limit {
            if metadata.len() > limit {
                return Err(ValidationError::ImageTooBig {
                    path: path.to_path_buf(),
                    size: metadata.len(),
                    limit,
                }
                .into());
            }
        }

        let bytes = tokio::fs::read(path).await.map_err(unreadable)?;
        let name = path.to_string_lossy();
        let mime_type = ImageMimeType::resolve(&name, &bytes)
            .ok_or_else(|| ValidationError::UnknownMimeType(name.to_string()))?;

        tracing::debug!(path = %path.display(), mime = %mime_type, size = bytes.len(), "Loaded image");
        Ok(Self::new(
            Some(path.to_path_buf()),
            bytes,
            mime_type,
            alt_text,
        ))
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> ImageMimeType {
        self.mime_type
    }

    pub fn alt_text(&self) -> Option<&str> {
        self.alt_text.as_deref()
    }

    pub fn set_alt_text(&mut self, alt_text: Option<String>) {
        self.alt_text = clean_alt_text(alt_text);
    }

    /// Name shown when asking for alt text
    pub fn display_name(&self) -> String {
        match &self.source_path {
            Some(path) => path.display().to_string(),
            None => format!("image.{}", self.mime_type.extension()),
        }
    }
}

fn clean_alt_text(alt_text: Option<String>) -> Option<String> {
    alt_text
        .map(|alt| alt.trim().to_string())
        .filter(|alt| !alt.is_empty())
}
