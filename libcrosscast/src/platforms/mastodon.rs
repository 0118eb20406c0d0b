//! Mastodon platform implementation
//!
//! Uses the REST API with a static bearer token. Media goes through the
//! asynchronous `/api/v2/media` endpoint: a 202 answer means the server is
//! still processing the file and `/api/v1/media/{id}` must be polled until it
//! answers 200.

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::credentials::MastodonCredentials;
use crate::error::{CrosscastError, PlatformError, Result};
use crate::media::Media;
use crate::platforms::{api_error, map_transport_error, read_json, Platform};
use crate::retry::{PollOutcome, PollStatus, RetryPolicy};
use crate::types::Post;

const NAME: &str = "Mastodon";

#[derive(Debug, Deserialize)]
struct UploadedMedia {
    id: Value,
}

#[derive(Debug, Serialize)]
struct NewStatus<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    media_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedStatus {
    url: Option<String>,
    uri: Option<String>,
}

pub struct MastodonClient {
    client: Client,
    credentials: MastodonCredentials,
    retry: RetryPolicy,
    polling: RetryPolicy,
}

impl MastodonClient {
    pub fn new(client: Client, credentials: MastodonCredentials) -> Self {
        Self {
            client,
            credentials,
            retry: RetryPolicy::network(),
            polling: RetryPolicy::media_polling(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_polling_policy(mut self, polling: RetryPolicy) -> Self {
        self.polling = polling;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.credentials.instance_url, path)
    }

    async fn send<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let build = &build;
        let token = self.credentials.token.as_str();
        self.retry
            .retry(what, move || async move {
                build()
                    .bearer_auth(token)
                    .send()
                    .await
                    .map_err(|e| CrosscastError::from(map_transport_error(e, what)))
            })
            .await
    }

    /// Upload one image and wait until the server is done processing it
    pub async fn upload(&self, media: &Media) -> Result<String> {
        let url = self.url("/api/v2/media");
        let file_name = format!("image.{}", media.mime_type().extension());
        debug!(
            "Uploading {} ({} bytes) to Mastodon as {}",
            media.display_name(),
            media.bytes().len(),
            file_name
        );

        let response = self
            .send("media upload", || {
                let mut form = Form::new().part("file", media_part(media, &file_name));
                if let Some(alt) = media.alt_text() {
                    form = form.text("description", alt.to_string());
                }
                self.client.post(&url).multipart(form)
            })
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::ACCEPTED {
            return Err(api_error(NAME, &url, response).await.into());
        }

        let uploaded: UploadedMedia = read_json(response, "media upload").await?;
        let media_id = match uploaded.id {
            Value::String(id) => id,
            Value::Number(id) => id.to_string(),
            other => {
                return Err(
                    PlatformError::InvalidResponse(format!("Unexpected media id: {}", other)).into(),
                )
            }
        };

        if status == StatusCode::ACCEPTED {
            self.wait_for_processing(&media_id).await?;
        }
        Ok(media_id)
    }

    async fn wait_for_processing(&self, media_id: &str) -> Result<()> {
        let url = self.url(&format!("/api/v1/media/{}", media_id));
        let what = format!("media {}", media_id);

        let outcome = self
            .polling
            .poll(&what, || self.processing_status(&url, &what))
            .await?;

        match outcome {
            PollOutcome::Ready(()) => {
                debug!("Mastodon finished processing media {}", media_id);
                Ok(())
            }
            PollOutcome::Exhausted { attempts } => Err(PlatformError::MediaNotReady {
                media_id: media_id.to_string(),
                attempts,
            }
            .into()),
        }
    }

    async fn processing_status(&self, url: &str, what: &str) -> Result<PollStatus<()>> {
        let response = self.send(what, || self.client.get(url)).await?;
        match response.status().as_u16() {
            200 => Ok(PollStatus::Ready(())),
            202 | 206 => Ok(PollStatus::Pending),
            _ => Err(api_error(NAME, url, response).await.into()),
        }
    }
}

fn media_part(media: &Media, file_name: &str) -> Part {
    let part = || Part::bytes(media.bytes().to_vec()).file_name(file_name.to_string());
    part().mime_str(media.mime_type().as_str()).unwrap_or_else(|_| part())
}

#[async_trait]
impl Platform for MastodonClient {
    fn name(&self) -> &str {
        "mastodon"
    }

    fn display_name(&self) -> &str {
        NAME
    }

    /// The token is static, so there is no session to open
    async fn authenticate(&self) -> Result<()> {
        if self.credentials.token.trim().is_empty() {
            return Err(PlatformError::Authentication("Mastodon token is empty".to_string()).into());
        }
        Ok(())
    }

    async fn post(&self, post: &Post) -> Result<String> {
        let media_ids = try_join_all(post.media().iter().map(|media| self.upload(media))).await?;

        let url = self.url("/api/v1/statuses");
        let body = NewStatus {
            status: post.text(),
            language: post.lang(),
            media_ids,
        };
        let response = self
            .send("status", || self.client.post(&url).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(api_error(NAME, &url, response).await.into());
        }

        let created: CreatedStatus = read_json(response, "status").await?;
        created.url.or(created.uri).ok_or_else(|| {
            PlatformError::InvalidResponse("Mastodon did not return the status URL".to_string())
                .into()
        })
    }
}
