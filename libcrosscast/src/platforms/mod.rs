//! Platform abstraction and implementations
//!
//! Every platform turns a [`Post`] into its own wire calls and answers with
//! the public URL of what it created. Both real clients talk plain HTTP
//! through a shared [`reqwest::Client`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{PlatformError, Result};
use crate::types::{PlatformId, Post};

pub mod bluesky;
pub mod mastodon;

// Test double, public for integration tests
pub mod mock;

/// Timeout for a single HTTP request; timeouts are retried
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Platform trait for unified social media platform interactions
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase identifier (e.g., "bluesky", "mastodon")
    fn name(&self) -> &str;

    /// Name shown to people (e.g., "Bluesky")
    fn display_name(&self) -> &str;

    /// Establish a session, if the platform needs one
    ///
    /// Safe to call more than once; implementations cache their session.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` when the credentials are
    /// rejected.
    async fn authenticate(&self) -> Result<()>;

    /// Publish the post and return its public URL
    async fn post(&self, post: &Post) -> Result<String>;
}

impl PlatformId {
    /// Prefix used in CLI output, e.g. `🦋 Bluesky`
    pub fn label(&self) -> String {
        format!("{} {}", self.emoji(), self.display_name())
    }
}

/// Build the HTTP client shared by all platforms
pub fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("crosscast/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)).into())
}

/// Map a transport failure, keeping timeouts distinguishable so they can
/// be retried
pub(crate) fn map_transport_error(error: reqwest::Error, what: &str) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Timeout(format!("{}: {}", what, error))
    } else if error.is_connect() {
        PlatformError::Network(format!("Connection error during {}: {}", what, error))
    } else {
        PlatformError::Network(format!("Request error during {}: {}", what, error))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
}

/// Turn a non-2xx response into [`PlatformError::Api`]
///
/// Both AT Protocol (`{error, message}`) and Mastodon (`{error,
/// error_description}`) error bodies are understood. 401 becomes an
/// authentication error with the same message.
pub(crate) async fn api_error(platform: &str, url: &str, response: Response) -> PlatformError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();

    let code = parsed
        .error
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "Unknown error".to_string());
    let error = PlatformError::Api {
        platform: platform.to_string(),
        url: url.to_string(),
        status: status.as_u16(),
        code,
        message: parsed.message.or(parsed.error_description),
    };

    if status == StatusCode::UNAUTHORIZED {
        PlatformError::Authentication(error.to_string())
    } else {
        error
    }
}

/// Decode a JSON response body
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| PlatformError::InvalidResponse(format!("{}: {}", what, e)).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_labels() {
        assert_eq!(PlatformId::Bluesky.label(), "🦋 Bluesky");
        assert_eq!(PlatformId::Mastodon.label(), "🐘 Mastodon");
    }

    #[test]
    fn test_http_client_builds() {
        assert!(http_client().is_ok());
    }
}
