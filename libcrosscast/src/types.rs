//! Core types for Crosscast

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::language::{normalize_language, LanguageDetector, WhatlangDetector};
use crate::media::Media;

/// Maximum number of images in a single post
pub const MAX_MEDIA: usize = 4;

/// The platforms Crosscast knows how to post to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    Bluesky,
    Mastodon,
}

impl PlatformId {
    pub const ALL: [PlatformId; 2] = [PlatformId::Bluesky, PlatformId::Mastodon];

    /// Lowercase identifier (e.g., "bluesky")
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::Bluesky => "bluesky",
            PlatformId::Mastodon => "mastodon",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformId::Bluesky => "Bluesky",
            PlatformId::Mastodon => "Mastodon",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            PlatformId::Bluesky => "🦋",
            PlatformId::Mastodon => "🐘",
        }
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bluesky" | "bsky" => Ok(PlatformId::Bluesky),
            "mastodon" | "mstdn" => Ok(PlatformId::Mastodon),
            other => Err(format!(
                "Unknown platform '{}'. Valid options: bluesky, mastodon",
                other
            )),
        }
    }
}

/// A platform-neutral post
///
/// The text length is checked against `limit` (in characters) when the post
/// is built; a post that exists is always postable length-wise.
#[derive(Debug, Clone)]
pub struct Post {
    text: String,
    media: Vec<Media>,
    lang: Option<String>,
    limit: usize,
}

impl Post {
    /// Build a post, detecting the language with [`WhatlangDetector`] when
    /// none is given
    pub fn new(
        text: impl Into<String>,
        limit: usize,
        media: Vec<Media>,
        lang: Option<String>,
    ) -> Result<Self> {
        Self::with_detector(text, limit, media, lang, &WhatlangDetector)
    }

    pub fn with_detector(
        text: impl Into<String>,
        limit: usize,
        media: Vec<Media>,
        lang: Option<String>,
        detector: &dyn LanguageDetector,
    ) -> Result<Self> {
        let text = text.into();

        if media.len() > MAX_MEDIA {
            return Err(ValidationError::TooManyImages {
                max: MAX_MEDIA,
                count: media.len(),
            }
            .into());
        }

        let length = text.chars().count();
        if length > limit {
            return Err(ValidationError::TooLong {
                limit,
                length,
                text,
            }
            .into());
        }

        let lang = match lang {
            Some(lang) => Some(normalize_language(&lang)?),
            None if !text.trim().is_empty() => detector
                .detect(&text)
                .and_then(|lang| normalize_language(&lang).ok()),
            None => None,
        };

        Ok(Self {
            text,
            media,
            lang,
            limit,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn media(&self) -> &[Media] {
        &self.media
    }

    pub fn has_media(&self) -> bool {
        !self.media.is_empty()
    }

    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Override the detected language
    pub fn set_language(&mut self, lang: &str) -> Result<()> {
        self.lang = Some(normalize_language(lang)?);
        Ok(())
    }
}

/// What a rich text span marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Link,
    Hashtag,
}

/// A byte range of the post text annotated as a link or hashtag
///
/// Offsets are UTF-8 byte offsets, `byte_end` exclusive. `payload` is the URL
/// for links and the tag name (without `#`) for hashtags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichTextSpan {
    pub byte_start: usize,
    pub byte_end: usize,
    pub kind: SpanKind,
    pub payload: String,
}

impl RichTextSpan {
    /// Whether `offset` falls inside `[byte_start, byte_end)`
    pub fn contains(&self, offset: usize) -> bool {
        self.byte_start <= offset && offset < self.byte_end
    }
}

/// Link preview built from a page's Open Graph metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub uri: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: Option<Media>,
}

/// How posting to one platform went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success { url: String },
    Failure { message: String },
}

/// Result of posting to a single platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    /// Platform name (e.g., "bluesky", "mastodon")
    pub platform: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl DispatchResult {
    pub fn success(platform: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            outcome: Outcome::Success { url: url.into() },
        }
    }

    pub fn failure(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            outcome: Outcome::Failure {
                message: message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { url } => Some(url),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { message } => Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrosscastError;
    use crate::language::FixedLanguage;
    use crate::media::ImageMimeType;

    fn image() -> Media {
        Media::new(None, b"42".to_vec(), ImageMimeType::Png, Some("alt".into()))
    }

    fn english() -> FixedLanguage {
        FixedLanguage(Some("en".into()))
    }

    #[test]
    fn test_post_preserves_text() {
        let text = "  forty-two\n with   spaces ";
        let post = Post::with_detector(text, 300, vec![], None, &english()).unwrap();
        assert_eq!(post.text(), text);
        assert!(!post.has_media());
        assert_eq!(post.lang(), Some("en"));
        assert_eq!(post.limit(), 300);
    }

    #[test]
    fn test_post_at_exact_limit_counts_characters() {
        // 300 multi-byte characters are still 300 characters
        let text = "é".repeat(300);
        assert!(Post::with_detector(&text, 300, vec![], None, &english()).is_ok());
    }

    #[test]
    fn test_post_too_long_returns_the_text() {
        let text = "forty-two".repeat(42);
        let err = Post::with_detector(text.clone(), 300, vec![], None, &english()).unwrap_err();
        match err {
            CrosscastError::Validation(error @ ValidationError::TooLong { .. }) => {
                assert_eq!(error.recovered_text(), Some(text.as_str()));
            }
            other => panic!("Expected TooLong, got {other:?}"),
        }
    }

    #[test]
    fn test_post_with_media() {
        let post = Post::with_detector("hi", 300, vec![image()], None, &english()).unwrap();
        assert_eq!(post.media().len(), 1);
        assert!(post.has_media());
    }

    #[test]
    fn test_post_rejects_five_images() {
        let media = vec![image(), image(), image(), image(), image()];
        let err = Post::with_detector("hi", 300, media, None, &english()).unwrap_err();
        assert!(matches!(
            err,
            CrosscastError::Validation(ValidationError::TooManyImages { max: 4, count: 5 })
        ));
    }

    #[test]
    fn test_post_autodetects_language() {
        let post = Post::new("hello world, the answer is 42", 300, vec![], None).unwrap();
        assert_eq!(post.lang(), Some("en"));
    }

    #[test]
    fn test_explicit_language_wins_over_detection() {
        let post = Post::with_detector("hello", 300, vec![], Some(" PT".into()), &english()).unwrap();
        assert_eq!(post.lang(), Some("pt"));
    }

    #[test]
    fn test_empty_text_is_not_detected() {
        let post = Post::with_detector("", 300, vec![image()], None, &english()).unwrap();
        assert_eq!(post.lang(), None);
    }

    #[test]
    fn test_set_language_override() {
        let mut post = Post::with_detector("hello", 300, vec![], None, &english()).unwrap();
        post.set_language("pt").unwrap();
        assert_eq!(post.lang(), Some("pt"));
        assert!(post.set_language("xpto").is_err());
        assert_eq!(post.lang(), Some("pt"));
    }

    #[test]
    fn test_platform_id_parsing() {
        assert_eq!("bluesky".parse::<PlatformId>().unwrap(), PlatformId::Bluesky);
        assert_eq!("BSKY".parse::<PlatformId>().unwrap(), PlatformId::Bluesky);
        assert_eq!("mastodon".parse::<PlatformId>().unwrap(), PlatformId::Mastodon);
        assert!("nostr".parse::<PlatformId>().is_err());
        assert_eq!(PlatformId::Mastodon.to_string(), "mastodon");
    }

    #[test]
    fn test_span_contains_is_half_open() {
        let span = RichTextSpan {
            byte_start: 4,
            byte_end: 8,
            kind: SpanKind::Link,
            payload: "https://x.y".into(),
        };
        assert!(!span.contains(3));
        assert!(span.contains(4));
        assert!(span.contains(7));
        assert!(!span.contains(8));
    }

    #[test]
    fn test_dispatch_result_serialization() {
        let ok = DispatchResult::success("mastodon", "https://tech.lgbt/@cuducos/42");
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["platform"], "mastodon");
        assert_eq!(json["status"], "success");
        assert_eq!(json["url"], "https://tech.lgbt/@cuducos/42");

        let failed = DispatchResult::failure("bluesky", "boom");
        assert!(!failed.is_success());
        assert_eq!(failed.error(), Some("boom"));
        assert_eq!(failed.url(), None);
    }
}
