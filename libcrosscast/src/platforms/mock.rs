//! Mock platform implementation for testing
//!
//! This module provides a configurable mock platform that can simulate various
//! behaviors including successes, failures, and delays. It's designed for use
//! in integration tests to verify multi-platform posting logic without requiring
//! actual platform credentials or network access.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{CrosscastError, PlatformError, Result};
use crate::platforms::Platform;
use crate::types::Post;

/// How a mock operation fails
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// A platform error, reported next to the other platforms' results
    Platform(PlatformError),
    /// Anything else, which aborts the whole dispatch
    Internal(String),
}

impl MockFailure {
    fn to_error(&self) -> CrosscastError {
        match self {
            MockFailure::Platform(error) => error.clone().into(),
            MockFailure::Internal(message) => CrosscastError::Internal(message.clone()),
        }
    }
}

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "mock-bluesky", "mock-mastodon")
    pub name: String,

    /// Error to return from `authenticate`
    pub auth_failure: Option<MockFailure>,

    /// Error to return from `post`
    pub post_failure: Option<MockFailure>,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Number of times authenticate has been called
    pub auth_call_count: Arc<Mutex<usize>>,

    /// Number of times post has been called
    pub post_call_count: Arc<Mutex<usize>>,

    /// Texts that have been posted (for verification)
    pub posted_content: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            auth_failure: None,
            post_failure: None,
            delay: Duration::from_millis(0),
            auth_call_count: Arc::new(Mutex::new(0)),
            post_call_count: Arc::new(Mutex::new(0)),
            posted_content: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
    authenticated: AtomicBool,
}

impl MockPlatform {
    /// Create a new mock platform with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            authenticated: AtomicBool::new(false),
        }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform that fails authentication
    pub fn auth_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            auth_failure: Some(MockFailure::Platform(PlatformError::Authentication(
                error.to_string(),
            ))),
            ..Default::default()
        })
    }

    /// Create a mock platform that fails posting with the given error
    pub fn post_failure(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            post_failure: Some(MockFailure::Platform(error)),
            ..Default::default()
        })
    }

    /// Create a mock platform whose post fails with a non-platform error
    pub fn internal_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            post_failure: Some(MockFailure::Internal(error.to_string())),
            ..Default::default()
        })
    }

    /// Create a mock platform with a delay
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Get the number of times authenticate was called
    pub fn auth_call_count(&self) -> usize {
        *self.config.auth_call_count.lock().unwrap()
    }

    /// Get the number of times post was called
    pub fn post_call_count(&self) -> usize {
        *self.config.post_call_count.lock().unwrap()
    }

    /// Get all texts that were posted
    pub fn posted_content(&self) -> Vec<String> {
        self.config.posted_content.lock().unwrap().clone()
    }

    /// Shared handle on the call counters, usable after the platform is
    /// boxed and moved into a dispatcher
    pub fn config(&self) -> MockConfig {
        self.config.clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn display_name(&self) -> &str {
        &self.config.name
    }

    async fn authenticate(&self) -> Result<()> {
        *self.config.auth_call_count.lock().unwrap() += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        match &self.config.auth_failure {
            Some(failure) => Err(failure.to_error()),
            None => {
                self.authenticated.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn post(&self, post: &Post) -> Result<String> {
        let count = {
            let mut count = self.config.post_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        if !self.authenticated.load(Ordering::SeqCst) {
            return Err(PlatformError::Authentication("Not authenticated".to_string()).into());
        }

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(failure) = &self.config.post_failure {
            return Err(failure.to_error());
        }

        self.config
            .posted_content
            .lock()
            .unwrap()
            .push(post.text().to_string());
        Ok(format!("https://{}.example/posts/{}", self.config.name, count))
    }
}
