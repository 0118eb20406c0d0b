//! Posting service
//!
//! The single entry point shared by the binaries: it validates a
//! [`PostRequest`] against the configured platforms, asks the person for
//! whatever is missing (alt text, language) through a [`Prompter`], and
//! hands the finished [`Post`] to the [`Dispatcher`].

use std::path::PathBuf;

use futures::future::try_join_all;
use reqwest::Client;
use tracing::{debug, info};

use crate::config::Config;
use crate::credentials::CredentialVault;
use crate::error::{Result, ValidationError};
use crate::language::{normalize_language, LanguageDetector, WhatlangDetector};
use crate::media::Media;
use crate::platforms::http_client;
use crate::poster::Dispatcher;
use crate::types::{DispatchResult, PlatformId, Post, MAX_MEDIA};

/// What to post, and how interactive to be about it
#[derive(Debug, Clone, Default)]
pub struct PostRequest {
    pub text: String,
    pub images: Vec<PathBuf>,
    /// Explicit language; skips detection and confirmation
    pub lang: Option<String>,
    /// Never prompt
    pub yes_to_all: bool,
    pub skip: Vec<PlatformId>,
}

impl PostRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Interactive questions asked while preparing a post
pub trait Prompter: Send + Sync {
    /// Alt text for the image shown as `image`; `None` leaves it empty
    fn alt_text(&self, image: &str) -> Option<String>;

    /// Confirm or correct the detected language
    ///
    /// Returns the language to use instead, or `None` to keep `detected`.
    fn confirm_language(&self, detected: Option<&str>) -> Option<String>;
}

/// Prompter that never asks anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn alt_text(&self, _image: &str) -> Option<String> {
        None
    }

    fn confirm_language(&self, _detected: Option<&str>) -> Option<String> {
        None
    }
}

pub struct PostingService {
    vault: CredentialVault,
    client: Client,
    prompter: Box<dyn Prompter>,
    detector: Box<dyn LanguageDetector>,
}

impl PostingService {
    pub fn new(vault: CredentialVault, client: Client) -> Self {
        Self {
            vault,
            client,
            prompter: Box::new(NoPrompt),
            detector: Box::new(WhatlangDetector),
        }
    }

    /// Build a service for every platform the configuration covers
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(CredentialVault::from_config(config), http_client()?))
    }

    pub fn with_prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Box::new(prompter);
        self
    }

    pub fn with_detector(mut self, detector: impl LanguageDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// Validate the request, then post it everywhere
    ///
    /// # Errors
    ///
    /// Configuration and validation problems fail the whole request before
    /// any network call. Per-platform failures are reported inside the
    /// returned results.
    pub async fn post(&self, request: PostRequest) -> Result<Vec<DispatchResult>> {
        let (vault, post) = self.prepare(&request).await?;

        let dispatcher = Dispatcher::from_vault(&vault, self.client.clone())?;
        info!(
            platforms = ?dispatcher.platform_names(),
            images = post.media().len(),
            lang = post.lang().unwrap_or("-"),
            "Dispatching post"
        );
        dispatcher.dispatch(&post).await
    }

    /// Everything [`post`](Self::post) does before touching the network
    ///
    /// Returns the vault narrowed to the requested platforms together with
    /// the validated post.
    pub async fn prepare(&self, request: &PostRequest) -> Result<(CredentialVault, Post)> {
        let mut vault = self.vault.clone();
        for platform in &request.skip {
            vault.disable(*platform);
        }
        vault.ensure_configured()?;

        if request.images.len() > MAX_MEDIA {
            return Err(ValidationError::TooManyImages {
                max: MAX_MEDIA,
                count: request.images.len(),
            }
            .into());
        }
        if request.text.trim().is_empty() {
            return Err(ValidationError::EmptyText.into());
        }

        let explicit_lang = request
            .lang
            .as_deref()
            .map(normalize_language)
            .transpose()?;

        let size_limit = vault.image_size_limit();
        let mut media = try_join_all(
            request
                .images
                .iter()
                .map(|path| Media::load(path, None, size_limit)),
        )
        .await?;

        if !request.yes_to_all {
            for image in &mut media {
                let alt = self.prompter.alt_text(&image.display_name());
                image.set_alt_text(alt);
            }
        }

        let preset_lang = explicit_lang.clone().or_else(|| vault.default_language());
        let mut post = Post::with_detector(
            request.text.as_str(),
            vault.post_length_limit(),
            media,
            preset_lang.clone(),
            self.detector.as_ref(),
        )?;

        if preset_lang.is_none() && !request.yes_to_all {
            if let Some(lang) = self.prompter.confirm_language(post.lang()) {
                post.set_language(&lang)?;
            }
        }
        debug!(lang = ?post.lang(), limit = post.limit(), "Prepared post");

        Ok((vault, post))
    }
}
