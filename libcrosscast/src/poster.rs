//! Multi-platform posting orchestration
//!
//! This module posts one [`Post`] to several platforms concurrently. A
//! platform failing never stops the others: its error is reported as a
//! [`DispatchResult`] failure next to the other platforms' results.

use futures::future::join_all;
use reqwest::Client;
use tracing::{info, warn};

use crate::credentials::{CredentialVault, Credentials};
use crate::error::{CrosscastError, Result};
use crate::platforms::{bluesky::BlueskyClient, mastodon::MastodonClient, Platform};
use crate::types::{DispatchResult, Post};

/// Authenticate (if needed) and post to a single platform
async fn post_to(platform: &dyn Platform, post: &Post) -> Result<String> {
    platform.authenticate().await?;
    platform.post(post).await
}

/// Post to every platform concurrently
///
/// Results come back in the same order as `platforms`. Platform errors
/// become [`Outcome::Failure`](crate::types::Outcome::Failure) entries; any
/// other error aborts the dispatch and is returned as `Err`.
pub async fn dispatch(post: &Post, platforms: &[&dyn Platform]) -> Result<Vec<DispatchResult>> {
    let futures = platforms.iter().map(|platform| async move {
        info!("Posting to platform: {}", platform.name());
        (platform.name().to_string(), post_to(*platform, post).await)
    });

    let mut results = Vec::with_capacity(platforms.len());
    for (name, outcome) in join_all(futures).await {
        match outcome {
            Ok(url) => {
                info!("Successfully posted to {}: {}", name, url);
                results.push(DispatchResult::success(name, url));
            }
            Err(CrosscastError::Platform(e)) => {
                warn!("Failed to post to {}: {}", name, e);
                results.push(DispatchResult::failure(name, e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(results)
}

/// Owns the platform clients for one run
pub struct Dispatcher {
    platforms: Vec<Box<dyn Platform>>,
}

impl Dispatcher {
    pub fn new(platforms: Vec<Box<dyn Platform>>) -> Self {
        Self { platforms }
    }

    /// Build one client per available platform in the vault
    pub fn from_vault(vault: &CredentialVault, client: Client) -> Result<Self> {
        Ok(Self::new(create_platforms(vault, client)?))
    }

    pub fn platform_names(&self) -> Vec<&str> {
        self.platforms.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    pub async fn dispatch(&self, post: &Post) -> Result<Vec<DispatchResult>> {
        let platforms: Vec<&dyn Platform> = self.platforms.iter().map(|p| p.as_ref()).collect();
        dispatch(post, &platforms).await
    }
}

/// Create platform clients for every available platform
///
/// All clients share `client` and its connection pool.
pub fn create_platforms(vault: &CredentialVault, client: Client) -> Result<Vec<Box<dyn Platform>>> {
    let mut platforms: Vec<Box<dyn Platform>> = Vec::new();

    for platform in vault.available_platforms() {
        info!("Creating {} platform client", platform.display_name());
        match vault.credentials_for(platform)? {
            Credentials::Bluesky(credentials) => {
                platforms.push(Box::new(BlueskyClient::new(client.clone(), credentials)));
            }
            Credentials::Mastodon(credentials) => {
                platforms.push(Box::new(MastodonClient::new(client.clone(), credentials)));
            }
        }
    }

    Ok(platforms)
}
