//! Crosscast - post once to Bluesky and Mastodon
//!
//! This library holds everything the `crosscast-post` and `crosscast-creds`
//! binaries share: configuration and the encrypted credential store, the
//! platform-neutral post model, the two platform clients and the concurrent
//! dispatcher.

pub mod card;
pub mod config;
pub mod credentials;
pub mod error;
pub mod language;
pub mod logging;
pub mod media;
pub mod platforms;
pub mod poster;
pub mod retry;
pub mod richtext;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{CredentialVault, EncryptedFileStore, StoredCredentials};
pub use error::{CrosscastError, Result};
pub use media::Media;
pub use service::{NoPrompt, PostRequest, PostingService, Prompter};
pub use types::{DispatchResult, Outcome, PlatformId, Post};
