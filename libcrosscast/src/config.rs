//! Configuration management for Crosscast
//!
//! Configuration is read once, from environment variables, and optionally
//! completed with the values saved in the encrypted credentials file.

use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::credentials::{
    BlueskyCredentials, EncryptedFileStore, MastodonCredentials, StoredCredentials,
};
use crate::error::{ConfigError, Result};
use crate::language::normalize_language;

pub const DEFAULT_BSKY_AGENT: &str = "https://bsky.social";
pub const DEFAULT_MASTODON_INSTANCE: &str = "https://mastodon.social";

pub const ENV_BSKY_AGENT: &str = "CROSSCAST_BSKY_AGENT";
pub const ENV_BSKY_EMAIL: &str = "CROSSCAST_BSKY_EMAIL";
pub const ENV_BSKY_PASSWORD: &str = "CROSSCAST_BSKY_PASSWORD";
pub const ENV_MASTODON_INSTANCE: &str = "CROSSCAST_MASTODON_INSTANCE";
pub const ENV_MASTODON_TOKEN: &str = "CROSSCAST_MASTODON_TOKEN";
pub const ENV_DEFAULT_LANG: &str = "CROSSCAST_DEFAULT_LANG";
pub const ENV_CREDENTIALS: &str = "CROSSCAST_CREDENTIALS";
pub const ENV_MASTER_PASSWORD: &str = "CROSSCAST_MASTER_PASSWORD";

#[derive(Clone)]
pub struct Config {
    /// Present only when both the identifier and the app password are set
    pub bluesky: Option<BlueskyCredentials>,
    pub mastodon: Option<MastodonCredentials>,
    pub default_language: Option<String>,
    /// Location of the encrypted credentials file
    pub credentials_path: PathBuf,
    pub master_password: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bluesky", &self.bluesky)
            .field("mastodon", &self.mastodon)
            .field("default_language", &self.default_language)
            .field("credentials_path", &self.credentials_path)
            .field(
                "master_password",
                &self.master_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Empty values count as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bluesky = match (var(ENV_BSKY_EMAIL), var(ENV_BSKY_PASSWORD)) {
            (Some(identifier), Some(secret)) => Some(BlueskyCredentials::new(
                var(ENV_BSKY_AGENT).as_deref().unwrap_or(DEFAULT_BSKY_AGENT),
                identifier,
                secret,
            )),
            _ => None,
        };

        let mastodon = var(ENV_MASTODON_TOKEN).map(|token| {
            MastodonCredentials::new(
                var(ENV_MASTODON_INSTANCE)
                    .as_deref()
                    .unwrap_or(DEFAULT_MASTODON_INSTANCE),
                token,
            )
        });

        let default_language = var(ENV_DEFAULT_LANG)
            .map(|lang| normalize_language(&lang))
            .transpose()?;

        let credentials_path = match var(ENV_CREDENTIALS) {
            Some(path) => PathBuf::from(shellexpand::tilde(&path).to_string()),
            None => default_credentials_path()?,
        };

        Ok(Self {
            bluesky,
            mastodon,
            default_language,
            credentials_path,
            master_password: lookup(ENV_MASTER_PASSWORD)
                .filter(|password| !password.is_empty())
                .map(Zeroizing::new),
        })
    }

    /// Whether the stored credentials could add anything to this config
    pub fn needs_stored_credentials(&self) -> bool {
        self.bluesky.is_none() || self.mastodon.is_none() || self.default_language.is_none()
    }

    /// The encrypted store at `credentials_path`, unlocked with `password`
    pub fn credential_store(&self, password: Zeroizing<String>) -> EncryptedFileStore {
        EncryptedFileStore::new(self.credentials_path.clone(), password)
    }

    /// Fill whatever the environment left unset with stored values
    ///
    /// Environment values always win, per platform.
    pub fn merge_stored(&mut self, stored: &StoredCredentials) {
        if self.bluesky.is_none() {
            self.bluesky = stored.bluesky.clone();
        }
        if self.mastodon.is_none() {
            self.mastodon = stored.mastodon.clone();
        }
        if self.default_language.is_none() {
            self.default_language = stored
                .language
                .as_deref()
                .and_then(|lang| normalize_language(lang).ok());
        }
    }
}

/// Default location of the encrypted credentials file
pub fn default_credentials_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("credentials.age"))
}

/// Trim an instance URL and add `https://` when no scheme is given
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CrosscastError, ValidationError};
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_empty_environment() {
        let config = Config::from_vars(vars(&[(ENV_CREDENTIALS, "/tmp/creds.age")])).unwrap();
        assert!(config.bluesky.is_none());
        assert!(config.mastodon.is_none());
        assert!(config.default_language.is_none());
        assert!(config.master_password.is_none());
        assert_eq!(config.credentials_path, PathBuf::from("/tmp/creds.age"));
        assert!(config.needs_stored_credentials());
    }

    #[test]
    fn test_bluesky_needs_both_email_and_password() {
        let config = Config::from_vars(vars(&[(ENV_BSKY_EMAIL, "me@example.com")])).unwrap();
        assert!(config.bluesky.is_none());

        let config = Config::from_vars(vars(&[
            (ENV_BSKY_EMAIL, "me@example.com"),
            (ENV_BSKY_PASSWORD, "app-password"),
        ]))
        .unwrap();
        let bluesky = config.bluesky.unwrap();
        assert_eq!(bluesky.agent_url, DEFAULT_BSKY_AGENT);
        assert_eq!(bluesky.identifier, "me@example.com");
        assert_eq!(bluesky.secret, "app-password");
    }

    #[test]
    fn test_custom_instances_are_normalized() {
        let config = Config::from_vars(vars(&[
            (ENV_BSKY_AGENT, "pds.example.com/"),
            (ENV_BSKY_EMAIL, "me"),
            (ENV_BSKY_PASSWORD, "pw"),
            (ENV_MASTODON_INSTANCE, "https://tech.lgbt/"),
            (ENV_MASTODON_TOKEN, "token"),
        ]))
        .unwrap();
        assert_eq!(config.bluesky.unwrap().agent_url, "https://pds.example.com");
        assert_eq!(config.mastodon.unwrap().instance_url, "https://tech.lgbt");
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = Config::from_vars(vars(&[
            (ENV_MASTODON_TOKEN, "  "),
            (ENV_DEFAULT_LANG, ""),
            (ENV_MASTER_PASSWORD, ""),
        ]))
        .unwrap();
        assert!(config.mastodon.is_none());
        assert!(config.default_language.is_none());
        assert!(config.master_password.is_none());
    }

    #[test]
    fn test_default_language_is_normalized() {
        let config = Config::from_vars(vars(&[(ENV_DEFAULT_LANG, " PT ")])).unwrap();
        assert_eq!(config.default_language.as_deref(), Some("pt"));

        let err = Config::from_vars(vars(&[(ENV_DEFAULT_LANG, "portuguese")])).unwrap_err();
        assert!(matches!(
            err,
            CrosscastError::Validation(ValidationError::InvalidLanguage(_))
        ));
    }

    #[test]
    fn test_credentials_path_expands_tilde() {
        let config = Config::from_vars(vars(&[(ENV_CREDENTIALS, "~/creds.age")])).unwrap();
        assert!(!config.credentials_path.to_string_lossy().starts_with('~'));
        assert!(config.credentials_path.ends_with("creds.age"));
    }

    #[test]
    fn test_environment_wins_over_stored_values() {
        let mut config = Config::from_vars(vars(&[
            (ENV_MASTODON_TOKEN, "env-token"),
            (ENV_CREDENTIALS, "/tmp/creds.age"),
        ]))
        .unwrap();

        let stored = StoredCredentials {
            bluesky: Some(BlueskyCredentials::new(DEFAULT_BSKY_AGENT, "stored", "pw")),
            mastodon: Some(MastodonCredentials::new("https://tech.lgbt", "stored-token")),
            language: Some("pt".to_string()),
        };
        config.merge_stored(&stored);

        assert_eq!(config.bluesky.as_ref().unwrap().identifier, "stored");
        assert_eq!(config.mastodon.as_ref().unwrap().token, "env-token");
        assert_eq!(config.mastodon.as_ref().unwrap().instance_url, DEFAULT_MASTODON_INSTANCE);
        assert_eq!(config.default_language.as_deref(), Some("pt"));
        assert!(!config.needs_stored_credentials());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_vars(vars(&[
            (ENV_BSKY_EMAIL, "me"),
            (ENV_BSKY_PASSWORD, "hunter2-secret"),
            (ENV_MASTER_PASSWORD, "master-secret"),
        ]))
        .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2-secret"));
        assert!(!debug.contains("master-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("https://bsky.social/"), "https://bsky.social");
        assert_eq!(normalize_base_url("mastodon.social"), "https://mastodon.social");
        assert_eq!(normalize_base_url("http://localhost:8080"), "http://localhost:8080");
    }
}
