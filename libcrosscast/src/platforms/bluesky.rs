//! Bluesky platform implementation
//!
//! Talks XRPC directly: `com.atproto.server.createSession` to log in,
//! `com.atproto.repo.uploadBlob` for images and link card thumbnails, and
//! `com.atproto.repo.createRecord` for the post itself.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::try_join_all;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::card::LinkCardResolver;
use crate::credentials::BlueskyCredentials;
use crate::error::{CrosscastError, PlatformError, Result};
use crate::media::Media;
use crate::platforms::{api_error, map_transport_error, read_json, Platform};
use crate::retry::RetryPolicy;
use crate::richtext;
use crate::types::{Post, RichTextSpan, SpanKind};

pub const POST_COLLECTION: &str = "app.bsky.feed.post";
pub const LINK_FEATURE: &str = "app.bsky.richtext.facet#link";
pub const TAG_FEATURE: &str = "app.bsky.richtext.facet#tag";
pub const IMAGES_EMBED: &str = "app.bsky.embed.images";
pub const EXTERNAL_EMBED: &str = "app.bsky.embed.external";

/// Public web app used to build post URLs
pub const APP_URL: &str = "https://bsky.app";

const NAME: &str = "Bluesky";

#[derive(Clone, Deserialize)]
pub struct Session {
    #[serde(rename = "accessJwt")]
    access_jwt: String,
    pub did: String,
    pub handle: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_jwt", &"<redacted>")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated { did: String, handle: String },
}

#[derive(Debug, Deserialize)]
struct UploadedBlob {
    blob: Value,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    uri: String,
}

pub struct BlueskyClient {
    client: Client,
    credentials: BlueskyCredentials,
    session: OnceCell<Session>,
    cards: LinkCardResolver,
    retry: RetryPolicy,
}

impl BlueskyClient {
    pub fn new(client: Client, credentials: BlueskyCredentials) -> Self {
        Self {
            cards: LinkCardResolver::new(client.clone()),
            client,
            credentials,
            session: OnceCell::new(),
            retry: RetryPolicy::network(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn auth_state(&self) -> AuthState {
        match self.session.get() {
            Some(session) => AuthState::Authenticated {
                did: session.did.clone(),
                handle: session.handle.clone(),
            },
            None => AuthState::Unauthenticated,
        }
    }

    fn xrpc_url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.credentials.agent_url, nsid)
    }

    /// Log in once; concurrent callers wait for the same login
    async fn session(&self) -> Result<&Session> {
        self.session
            .get_or_try_init(|| self.create_session())
            .await
    }

    async fn create_session(&self) -> Result<Session> {
        debug!("Creating Bluesky session for {}", self.credentials.identifier);
        let url = self.xrpc_url("com.atproto.server.createSession");
        let body = json!({
            "identifier": self.credentials.identifier,
            "password": self.credentials.secret,
        });

        let response = self
            .send("createSession", || self.client.post(&url).json(&body))
            .await?;
        if !response.status().is_success() {
            let error = api_error(NAME, &url, response).await;
            let error = if matches!(error, PlatformError::Api { status: 400, .. }) {
                PlatformError::Authentication(error.to_string())
            } else {
                error
            };
            return Err(error.into());
        }

        let session: Session = read_json(response, "createSession").await?;
        info!("Authenticated with Bluesky as {}", session.handle);
        Ok(session)
    }

    async fn send<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let build = &build;
        self.retry
            .retry(what, move || async move {
                build()
                    .send()
                    .await
                    .map_err(|e| CrosscastError::from(map_transport_error(e, what)))
            })
            .await
    }

    /// Upload raw image bytes, returning the blob reference to embed
    async fn upload_blob(&self, session: &Session, media: &Media) -> Result<Value> {
        let url = self.xrpc_url("com.atproto.repo.uploadBlob");
        debug!(
            "Uploading {} ({} bytes) to Bluesky",
            media.display_name(),
            media.bytes().len()
        );

        let response = self
            .send("uploadBlob", || {
                self.client
                    .post(&url)
                    .bearer_auth(&session.access_jwt)
                    .header(CONTENT_TYPE, media.mime_type().as_str())
                    .body(media.bytes().to_vec())
            })
            .await?;
        if !response.status().is_success() {
            return Err(api_error(NAME, &url, response).await.into());
        }

        let uploaded: UploadedBlob = read_json(response, "uploadBlob").await?;
        Ok(uploaded.blob)
    }

    async fn embed_for(
        &self,
        session: &Session,
        post: &Post,
        first_url: Option<&str>,
    ) -> Result<Option<Value>> {
        if post.has_media() {
            let blobs = try_join_all(
                post.media()
                    .iter()
                    .map(|media| self.upload_blob(session, media)),
            )
            .await?;
            let images: Vec<Value> = post
                .media()
                .iter()
                .zip(blobs)
                .map(|(media, blob)| json!({"alt": media.alt_text().unwrap_or(""), "image": blob}))
                .collect();
            return Ok(Some(json!({"$type": IMAGES_EMBED, "images": images})));
        }

        let Some(url) = first_url else {
            return Ok(None);
        };
        let Some(card) = self.cards.resolve(url).await else {
            return Ok(None);
        };

        debug!("Embedding link card for {}", card.uri);
        let mut external = json!({
            "uri": card.uri,
            "title": card.title,
            "description": card.description.as_deref().unwrap_or(""),
        });
        if let Some(thumbnail) = &card.thumbnail {
            external["thumb"] = self.upload_blob(session, thumbnail).await?;
        }
        Ok(Some(json!({"$type": EXTERNAL_EMBED, "external": external})))
    }
}

#[async_trait]
impl Platform for BlueskyClient {
    fn name(&self) -> &str {
        "bluesky"
    }

    fn display_name(&self) -> &str {
        NAME
    }

    async fn authenticate(&self) -> Result<()> {
        self.session().await.map(|_| ())
    }

    async fn post(&self, post: &Post) -> Result<String> {
        let session = self.session().await?;
        let encoded = richtext::encode(post.text());
        let embed = self
            .embed_for(session, post, encoded.first_url.as_deref())
            .await?;

        let record = build_record(post.text(), post.lang(), &encoded.spans, embed, Utc::now());
        let body = json!({
            "repo": session.did,
            "collection": POST_COLLECTION,
            "record": record,
        });

        let url = self.xrpc_url("com.atproto.repo.createRecord");
        let response = self
            .send("createRecord", || {
                self.client
                    .post(&url)
                    .bearer_auth(&session.access_jwt)
                    .json(&body)
            })
            .await?;
        if !response.status().is_success() {
            return Err(api_error(NAME, &url, response).await.into());
        }

        let created: CreatedRecord = read_json(response, "createRecord").await?;
        debug!("Created Bluesky record {}", created.uri);
        post_url(&session.handle, &created.uri)
    }
}

/// Build an `app.bsky.feed.post` record
///
/// `createdAt` is truncated to whole seconds; `langs`, `facets` and `embed`
/// are left out when empty.
pub fn build_record(
    text: &str,
    lang: Option<&str>,
    spans: &[RichTextSpan],
    embed: Option<Value>,
    created_at: DateTime<Utc>,
) -> Value {
    let mut record = json!({
        "$type": POST_COLLECTION,
        "text": text,
        "createdAt": created_at.to_rfc3339_opts(SecondsFormat::Secs, false),
    });
    if let Some(lang) = lang {
        record["langs"] = json!([lang]);
    }
    if !spans.is_empty() {
        record["facets"] = Value::Array(spans.iter().map(facet).collect());
    }
    if let Some(embed) = embed {
        record["embed"] = embed;
    }
    record
}

fn facet(span: &RichTextSpan) -> Value {
    let feature = match span.kind {
        SpanKind::Link => json!({"$type": LINK_FEATURE, "uri": span.payload}),
        SpanKind::Hashtag => json!({"$type": TAG_FEATURE, "tag": span.payload}),
    };
    json!({
        "index": {"byteStart": span.byte_start, "byteEnd": span.byte_end},
        "features": [feature],
    })
}

/// Web URL of a post, from the handle and the record's `at://` URI
pub fn post_url(handle: &str, at_uri: &str) -> Result<String> {
    let rkey = at_uri
        .rsplit('/')
        .next()
        .filter(|rkey| !rkey.is_empty() && at_uri.contains('/'))
        .ok_or_else(|| PlatformError::InvalidResponse(format!("Unexpected record URI: {}", at_uri)))?;
    Ok(format!("{}/profile/{}/post/{}", APP_URL, handle, rkey))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 15, 9, 26).unwrap()
            + chrono::Duration::milliseconds(535)
    }

    #[test]
    fn test_minimal_record() {
        let record = build_record("forty-two", None, &[], None, created_at());
        assert_eq!(
            record,
            json!({
                "$type": "app.bsky.feed.post",
                "text": "forty-two",
                "createdAt": "2024-03-14T15:09:26+00:00",
            })
        );
    }

    #[test]
    fn test_record_with_language_facets_and_embed() {
        let text = "see https://example.com/x#42 for #share info";
        let encoded = richtext::encode(text);
        let embed = json!({"$type": IMAGES_EMBED, "images": []});
        let record = build_record(text, Some("en"), &encoded.spans, Some(embed.clone()), created_at());

        assert_eq!(record["langs"], json!(["en"]));
        assert_eq!(record["embed"], embed);
        assert_eq!(
            record["facets"],
            json!([
                {
                    "index": {"byteStart": 4, "byteEnd": 28},
                    "features": [{"$type": LINK_FEATURE, "uri": "https://example.com/x#42"}],
                },
                {
                    "index": {"byteStart": 33, "byteEnd": 39},
                    "features": [{"$type": TAG_FEATURE, "tag": "share"}],
                },
            ])
        );
    }

    #[test]
    fn test_post_url() {
        assert_eq!(
            post_url(
                "cuducos.bsky.social",
                "at://did:plc:42/app.bsky.feed.post/3kabc2def"
            )
            .unwrap(),
            "https://bsky.app/profile/cuducos.bsky.social/post/3kabc2def"
        );
        assert!(post_url("someone", "").is_err());
        assert!(post_url("someone", "at://did:plc:42/app.bsky.feed.post/").is_err());
    }

    #[test]
    fn test_session_debug_hides_token() {
        let session: Session = serde_json::from_value(json!({
            "accessJwt": "very-secret-jwt",
            "did": "did:plc:42",
            "handle": "cuducos.bsky.social",
            "refreshJwt": "ignored",
        }))
        .unwrap();
        let debug = format!("{:?}", session);
        assert!(!debug.contains("very-secret-jwt"));
        assert!(debug.contains("did:plc:42"));
    }

    #[test]
    fn test_starts_unauthenticated() {
        let client = BlueskyClient::new(
            Client::new(),
            BlueskyCredentials::new("https://bsky.social", "me", "pw"),
        );
        assert_eq!(client.auth_state(), AuthState::Unauthenticated);
        assert_eq!(client.name(), "bluesky");
        assert_eq!(client.display_name(), "Bluesky");
    }
}
