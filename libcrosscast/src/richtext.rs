//! Rich text annotation for AT Protocol posts
//!
//! Bluesky does not parse links or hashtags out of the post text: the client
//! has to send them as facets, i.e. UTF-8 byte ranges over the text. Links are
//! found first; hashtags that start inside a link (e.g. a URL fragment) are
//! dropped.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{RichTextSpan, SpanKind};

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[\w_-]+(?:\.[\w_-]+)+(?:[\w.,@?^=%&:/~+#-]*[\w@?^=%&/~+#-])?")
        .expect("URL pattern is valid")
});

/// A `#` at the start of the text or after whitespace; the tag is group 1
static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(#[^\s#]+)").expect("hashtag pattern is valid"));

/// Spans found in a post text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedText {
    /// Links first, then hashtags, each group in the order they appear
    pub spans: Vec<RichTextSpan>,
    /// First URL in the text, used to build a link card
    pub first_url: Option<String>,
}

impl EncodedText {
    pub fn links(&self) -> impl Iterator<Item = &RichTextSpan> {
        self.spans.iter().filter(|s| s.kind == SpanKind::Link)
    }

    pub fn hashtags(&self) -> impl Iterator<Item = &RichTextSpan> {
        self.spans.iter().filter(|s| s.kind == SpanKind::Hashtag)
    }
}

/// Find links and hashtags in `text` and compute their byte offsets
pub fn encode(text: &str) -> EncodedText {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();

    let mut cursor = 0;
    for found in URL.find_iter(text) {
        let url = found.as_str();
        let Some(start) = find_from(bytes, url.as_bytes(), cursor) else {
            continue;
        };
        let end = start + url.len();
        spans.push(RichTextSpan {
            byte_start: start,
            byte_end: end,
            kind: SpanKind::Link,
            payload: url.to_string(),
        });
        cursor = end;
    }

    let first_url = spans.first().map(|span| span.payload.clone());
    let links = spans.len();

    let mut cursor = 0;
    for captures in HASHTAG.captures_iter(text) {
        let Some(token) = captures.get(1).map(|found| found.as_str()) else {
            continue;
        };
        let tag = token[1..].trim_end_matches(|c: char| c.is_ascii_punctuation());
        if tag.chars().count() < 2 || tag.chars().all(char::is_numeric) {
            continue;
        }

        let needle = &token[..1 + tag.len()];
        let Some(start) = find_from(bytes, needle.as_bytes(), cursor) else {
            continue;
        };
        let end = start + needle.len();
        cursor = end;

        if spans[..links].iter().any(|link| link.contains(start)) {
            continue;
        }
        spans.push(RichTextSpan {
            byte_start: start,
            byte_end: end,
            kind: SpanKind::Hashtag,
            payload: tag.to_string(),
        });
    }

    EncodedText { spans, first_url }
}

fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| position + from)
}
