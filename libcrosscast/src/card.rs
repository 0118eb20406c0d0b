//! Link preview cards
//!
//! A card is built from the Open Graph `<meta>` tags of the first page linked
//! in a post. Everything here is best-effort: any failure means "no card" (or
//! "no thumbnail"), never an error for the post itself.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::media::Media;
use crate::types::Card;

/// Open Graph properties read from a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenGraph {
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// Extract `og:*` properties from an HTML document
///
/// Tags are matched on `property`, falling back to `name`; the first
/// non-empty `content` for each property wins.
pub fn parse_open_graph(html: &str) -> OpenGraph {
    let mut graph = OpenGraph::default();
    let dom = match tl::parse(html, tl::ParserOptions::default()) {
        Ok(dom) => dom,
        Err(e) => {
            debug!("Could not parse HTML: {}", e);
            return graph;
        }
    };

    for node in dom.nodes() {
        let Some(tag) = node.as_tag() else {
            continue;
        };
        if !tag.name().as_utf8_str().eq_ignore_ascii_case("meta") {
            continue;
        }

        let attributes = tag.attributes();
        let property = attributes
            .get("property")
            .or_else(|| attributes.get("name"))
            .flatten()
            .map(|value| value.as_utf8_str().trim().to_lowercase());
        let content = attributes
            .get("content")
            .flatten()
            .map(|value| unescape(value.as_utf8_str().trim()))
            .filter(|value| !value.is_empty());

        let (Some(property), Some(content)) = (property, content) else {
            continue;
        };
        let slot = match property.as_str() {
            "og:title" => &mut graph.title,
            "og:url" => &mut graph.url,
            "og:description" => &mut graph.description,
            "og:image" => &mut graph.image,
            _ => continue,
        };
        slot.get_or_insert(content);
    }

    graph
}

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|quot|apos|lt|gt|amp|nbsp);")
        .expect("entity pattern is valid")
});

/// Decode named and numeric character references in one pass
fn unescape(value: &str) -> String {
    ENTITY
        .replace_all(value, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "quot" => Some('"'),
                "apos" => Some('\''),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "nbsp" => Some('\u{a0}'),
                _ => {
                    let code = match entity
                        .strip_prefix("#x")
                        .or_else(|| entity.strip_prefix("#X"))
                    {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => entity[1..].parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            // Invalid code points are left as written
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Fetches pages and turns their Open Graph metadata into a [`Card`]
#[derive(Debug, Clone)]
pub struct LinkCardResolver {
    client: Client,
}

impl LinkCardResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a card for `url`, or `None` when the page is unreachable or
    /// lacks `og:title` / `og:url`
    pub async fn resolve(&self, url: &str) -> Option<Card> {
        let html = self.fetch(url).await?;
        let graph = parse_open_graph(&String::from_utf8_lossy(&html));

        let Some(title) = graph.title else {
            debug!(url, "No og:title, skipping card");
            return None;
        };
        let Some(uri) = graph.url else {
            debug!(url, "No og:url, skipping card");
            return None;
        };

        let thumbnail = match graph.image {
            Some(image) => self.thumbnail(url, &image).await,
            None => None,
        };

        Some(Card {
            uri,
            title,
            description: graph.description,
            thumbnail,
        })
    }

    async fn thumbnail(&self, page_url: &str, image: &str) -> Option<Media> {
        let image_url = match Url::parse(page_url).and_then(|base| base.join(image)) {
            Ok(resolved) => resolved.to_string(),
            Err(e) => {
                debug!(page_url, image, "Could not resolve og:image: {}", e);
                return None;
            }
        };

        let bytes = self.fetch(&image_url).await?;
        match Media::from_bytes(&image_url, bytes, None) {
            Ok(media) => Some(media),
            Err(e) => {
                debug!(image_url, "Dropping card thumbnail: {}", e);
                None
            }
        }
    }

    async fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url, "Could not fetch: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(url, status = response.status().as_u16(), "Could not fetch");
            return None;
        }

        match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                debug!(url, "Could not read response body: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_open_graph() {
        let html = r#"
            <html><head>
                <meta property="og:title" content="Sample Page Title">
                <meta property="og:url" content="http://example.com/sample-page">
                <meta property="og:description" content="Fish &amp; chips">
                <meta property="og:image" content="/sample-image.jpg">
                <meta name="twitter:card" content="summary">
            </head><body></body></html>
        "#;

        let graph = parse_open_graph(html);
        assert_eq!(graph.title.as_deref(), Some("Sample Page Title"));
        assert_eq!(graph.url.as_deref(), Some("http://example.com/sample-page"));
        assert_eq!(graph.description.as_deref(), Some("Fish & chips"));
        assert_eq!(graph.image.as_deref(), Some("/sample-image.jpg"));
    }

    #[test]
    fn test_name_attribute_fallback_and_first_wins() {
        let html = r#"
            <meta name="og:title" content="First">
            <meta property="og:title" content="Second">
            <meta property="og:url" content="">
        "#;

        let graph = parse_open_graph(html);
        assert_eq!(graph.title.as_deref(), Some("First"));
        assert_eq!(graph.url, None);
    }

    #[test]
    fn test_numeric_character_references() {
        assert_eq!(
            unescape("It&#8217;s &#x201C;fine&#X201D;"),
            "It\u{2019}s \u{201C}fine\u{201D}"
        );
        assert_eq!(unescape("Tom &amp;amp; Jerry&#39;s"), "Tom &amp; Jerry's");
        assert_eq!(
            unescape("bad &#xD800; and &#1114112; kept"),
            "bad &#xD800; and &#1114112; kept"
        );
        assert_eq!(unescape("&copy; unknown"), "&copy; unknown");
    }

    #[test]
    fn test_numeric_reference_in_title() {
        let html = r#"<meta property="og:title" content="It&#8217;s here &#x2014; now">"#;
        let graph = parse_open_graph(html);
        assert_eq!(graph.title.as_deref(), Some("It\u{2019}s here \u{2014} now"));
    }

    #[test]
    fn test_no_meta_tags() {
        assert_eq!(parse_open_graph("<p>just text</p>"), OpenGraph::default());
        assert_eq!(parse_open_graph(""), OpenGraph::default());
    }
}
