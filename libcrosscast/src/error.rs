//! Error types for Crosscast

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosscastError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid post: {0}")]
    Validation(#[from] ValidationError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Unexpected error: {0}")]
    Internal(String),
}

impl CrosscastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosscastError::Validation(_) => 3,
            CrosscastError::Platform(PlatformError::Authentication(_)) => 2,
            CrosscastError::Platform(_) => 1,
            CrosscastError::Config(_) => 1,
            CrosscastError::Internal(_) => 1,
        }
    }

    /// Whether this error belongs to a single platform and can be reported
    /// next to the results of the other platforms.
    pub fn is_platform_error(&self) -> bool {
        matches!(self, CrosscastError::Platform(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read credentials file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse credentials: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize credentials: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error(
        "No platforms available. Set at least one of: \
         CROSSCAST_BSKY_EMAIL and CROSSCAST_BSKY_PASSWORD, or CROSSCAST_MASTODON_TOKEN \
         (or run `crosscast-creds config`)"
    )]
    NoPlatforms,

    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Failed to decrypt credentials (wrong password?)")]
    DecryptionFailed,

    #[error("Credentials file '{}' is a symbolic link", .0.display())]
    Symlink(PathBuf),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error(
        "Text cannot be longer than {limit} characters. This text is {length} characters long"
    )]
    TooLong {
        limit: usize,
        length: usize,
        /// The rejected text, handed back so the draft is never lost
        text: String,
    },

    #[error("Text cannot be empty")]
    EmptyText,

    #[error("You can only post up to {max} images (got {count})")]
    TooManyImages { max: usize, count: usize },

    #[error("Could not read image '{}': {source}", .path.display())]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not guess mime type for '{0}'")]
    UnknownMimeType(String),

    #[error("Image '{}' is {size} bytes, the limit is {limit} bytes", .path.display())]
    ImageTooBig { path: PathBuf, size: u64, limit: u64 },

    #[error("Invalid language '{0}' (expected a 2-letter ISO 639-1 code)")]
    InvalidLanguage(String),
}

impl ValidationError {
    /// The original text of a post rejected for its length
    pub fn recovered_text(&self) -> Option<&str> {
        match self {
            ValidationError::TooLong { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error(
        "Error from {platform} server - {url} HTTP Status {status} - {}",
        details(.code, .message)
    )]
    Api {
        platform: String,
        url: String,
        status: u16,
        code: String,
        message: Option<String>,
    },

    #[error("Media {media_id} was not ready after {attempts} attempts")]
    MediaNotReady { media_id: String, attempts: u32 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

fn details(code: &str, message: &Option<String>) -> String {
    match message {
        Some(message) => format!("{}: {}", code, message),
        None => code.to_string(),
    }
}
