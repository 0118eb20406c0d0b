//! Credential resolution and the encrypted credentials file
//!
//! Credentials come from environment variables (see [`crate::config`]) or from
//! a single passphrase-encrypted TOML document written by `crosscast-creds`.
//! The [`CredentialVault`] is the read-only view the rest of the library uses
//! to know which platforms can be posted to.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::{normalize_base_url, Config};
use crate::error::{ConfigError, Result};
use crate::types::PlatformId;

/// Bluesky only accepts posts up to this many characters
pub const BLUESKY_POST_LIMIT: usize = 300;

/// Limit used when Bluesky is not configured
pub const DEFAULT_POST_LIMIT: usize = 1024;

/// Bluesky rejects blobs larger than 1 MiB
pub const BLUESKY_IMAGE_SIZE_LIMIT: u64 = 1_048_576;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct BlueskyCredentials {
    pub agent_url: String,
    /// Handle or email
    pub identifier: String,
    /// App password
    pub secret: String,
}

impl BlueskyCredentials {
    pub fn new(
        agent_url: impl AsRef<str>,
        identifier: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            agent_url: normalize_base_url(agent_url.as_ref()),
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for BlueskyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueskyCredentials")
            .field("agent_url", &self.agent_url)
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct MastodonCredentials {
    pub instance_url: String,
    /// Access token with the `write:statuses` and `write:media` scopes
    pub token: String,
}

impl MastodonCredentials {
    pub fn new(instance_url: impl AsRef<str>, token: impl Into<String>) -> Self {
        Self {
            instance_url: normalize_base_url(instance_url.as_ref()),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for MastodonCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MastodonCredentials")
            .field("instance_url", &self.instance_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Bluesky(BlueskyCredentials),
    Mastodon(MastodonCredentials),
}

impl Credentials {
    pub fn platform(&self) -> PlatformId {
        match self {
            Credentials::Bluesky(_) => PlatformId::Bluesky,
            Credentials::Mastodon(_) => PlatformId::Mastodon,
        }
    }
}

/// Contents of the encrypted credentials file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bluesky: Option<BlueskyCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mastodon: Option<MastodonCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl StoredCredentials {
    pub fn is_empty(&self) -> bool {
        self.bluesky.is_none() && self.mastodon.is_none() && self.language.is_none()
    }
}

/// Validate that a path is not a symlink
///
/// Missing paths are fine; they are reported when actually read.
pub fn validate_not_symlink(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            Err(ConfigError::Symlink(path.to_path_buf()).into())
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConfigError::ReadError(e).into()),
    }
}

/// Passphrase-encrypted credentials file
///
/// The document is TOML encrypted with `age`; the scrypt stanza in the age
/// header carries the salt, so the file is self-contained. On Unix the file
/// is created with mode 600.
pub struct EncryptedFileStore {
    path: PathBuf,
    password: Zeroizing<String>,
}

impl EncryptedFileStore {
    pub fn new(path: PathBuf, password: Zeroizing<String>) -> Self {
        Self { path, password }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Decrypt the stored credentials; a missing file reads as empty
    pub fn load(&self) -> Result<StoredCredentials> {
        validate_not_symlink(&self.path)?;
        if !self.exists() {
            tracing::debug!("No credentials file at {:?}", self.path);
            return Ok(StoredCredentials::default());
        }

        let encrypted = std::fs::read(&self.path).map_err(ConfigError::ReadError)?;
        let decrypted = self.decrypt(&encrypted)?;
        let stored = toml::from_str(&decrypted).map_err(ConfigError::ParseError)?;

        tracing::debug!("Loaded encrypted credentials from {:?}", self.path);
        Ok(stored)
    }

    pub fn save(&self, stored: &StoredCredentials) -> Result<()> {
        validate_not_symlink(&self.path)?;
        let document = Zeroizing::new(toml::to_string(stored).map_err(ConfigError::SerializeError)?);
        let encrypted = self.encrypt(&document)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::ReadError)?;
        }
        std::fs::write(&self.path, encrypted).map_err(ConfigError::ReadError)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms).map_err(ConfigError::ReadError)?;
        }

        tracing::debug!("Saved encrypted credentials to {:?}", self.path);
        Ok(())
    }

    /// Remove the file; returns whether there was anything to remove
    pub fn delete(&self) -> Result<bool> {
        validate_not_symlink(&self.path)?;
        if !self.exists() {
            tracing::debug!("Credentials file {:?} not found (already deleted)", self.path);
            return Ok(false);
        }

        std::fs::remove_file(&self.path).map_err(ConfigError::ReadError)?;
        tracing::debug!("Deleted credentials file {:?}", self.path);
        Ok(true)
    }

    fn encrypt(&self, data: &str) -> Result<Vec<u8>> {
        let encryptor = age::Encryptor::with_user_passphrase(age::secrecy::Secret::new(
            (*self.password).clone(),
        ));

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| ConfigError::Encryption(e.to_string()))?;

        writer
            .write_all(data.as_bytes())
            .map_err(|e| ConfigError::Encryption(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| ConfigError::Encryption(e.to_string()))?;

        Ok(encrypted)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<String>> {
        let decryptor = match age::Decryptor::new(data) {
            Ok(age::Decryptor::Passphrase(d)) => d,
            Ok(_) => {
                return Err(ConfigError::Encryption(
                    "Invalid encryption format (expected passphrase)".to_string(),
                )
                .into())
            }
            Err(e) => return Err(ConfigError::Encryption(e.to_string()).into()),
        };

        let mut reader = decryptor
            .decrypt(&age::secrecy::Secret::new((*self.password).clone()), None)
            .map_err(|e| match e {
                age::DecryptError::DecryptionFailed
                | age::DecryptError::KeyDecryptionFailed
                | age::DecryptError::NoMatchingKeys => ConfigError::DecryptionFailed,
                other => ConfigError::Encryption(other.to_string()),
            })?;

        let mut decrypted = Zeroizing::new(vec![]);
        reader
            .read_to_end(&mut decrypted)
            .map_err(|_| ConfigError::DecryptionFailed)?;

        let text = std::str::from_utf8(&decrypted)
            .map_err(|e| ConfigError::Encryption(format!("Invalid UTF-8: {}", e)))?;
        Ok(Zeroizing::new(text.to_string()))
    }
}

/// Which platforms can be posted to, and with what limits
#[derive(Debug, Clone, Default)]
pub struct CredentialVault {
    bluesky: Option<BlueskyCredentials>,
    mastodon: Option<MastodonCredentials>,
    default_language: Option<String>,
    disabled: HashSet<PlatformId>,
}

impl CredentialVault {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bluesky: config.bluesky.clone(),
            mastodon: config.mastodon.clone(),
            default_language: config.default_language.clone(),
            disabled: HashSet::new(),
        }
    }

    /// Platforms with complete credentials that were not disabled, in
    /// [`PlatformId::ALL`] order
    pub fn available_platforms(&self) -> Vec<PlatformId> {
        PlatformId::ALL
            .into_iter()
            .filter(|platform| self.is_available(*platform))
            .collect()
    }

    pub fn is_configured(&self, platform: PlatformId) -> bool {
        match platform {
            PlatformId::Bluesky => self.bluesky.is_some(),
            PlatformId::Mastodon => self.mastodon.is_some(),
        }
    }

    pub fn is_available(&self, platform: PlatformId) -> bool {
        self.is_configured(platform) && !self.disabled.contains(&platform)
    }

    /// Skip a platform for this run
    pub fn disable(&mut self, platform: PlatformId) {
        tracing::debug!("Skipping {}", platform.display_name());
        self.disabled.insert(platform);
    }

    pub fn credentials_for(&self, platform: PlatformId) -> Result<Credentials> {
        let credentials = match platform {
            PlatformId::Bluesky => self.bluesky.clone().map(Credentials::Bluesky),
            PlatformId::Mastodon => self.mastodon.clone().map(Credentials::Mastodon),
        };
        credentials.ok_or_else(|| ConfigError::NotConfigured(platform.display_name().to_string()).into())
    }

    /// 300 characters when Bluesky is configured (even if skipped), 1024
    /// otherwise
    pub fn post_length_limit(&self) -> usize {
        if self.is_configured(PlatformId::Bluesky) {
            BLUESKY_POST_LIMIT
        } else {
            DEFAULT_POST_LIMIT
        }
    }

    /// Per-image size limit, set only when posting to Bluesky
    pub fn image_size_limit(&self) -> Option<u64> {
        self.is_available(PlatformId::Bluesky)
            .then_some(BLUESKY_IMAGE_SIZE_LIMIT)
    }

    pub fn ensure_configured(&self) -> Result<()> {
        if self.available_platforms().is_empty() {
            return Err(ConfigError::NoPlatforms.into());
        }
        Ok(())
    }

    pub fn default_language(&self) -> Option<String> {
        self.default_language.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrosscastError;

    fn bluesky() -> BlueskyCredentials {
        BlueskyCredentials::new("https://bsky.social", "me@example.com", "app-password")
    }

    fn mastodon() -> MastodonCredentials {
        MastodonCredentials::new("https://tech.lgbt", "mastodon-token")
    }

    fn vault(bluesky: Option<BlueskyCredentials>, mastodon: Option<MastodonCredentials>) -> CredentialVault {
        CredentialVault {
            bluesky,
            mastodon,
            ..Default::default()
        }
    }

    fn store(dir: &tempfile::TempDir, password: &str) -> EncryptedFileStore {
        EncryptedFileStore::new(
            dir.path().join("crosscast").join("credentials.age"),
            Zeroizing::new(password.to_string()),
        )
    }

    #[test]
    fn test_available_platforms_order() {
        let vault = vault(Some(bluesky()), Some(mastodon()));
        assert_eq!(
            vault.available_platforms(),
            vec![PlatformId::Bluesky, PlatformId::Mastodon]
        );
        assert!(vault.ensure_configured().is_ok());
    }

    #[test]
    fn test_no_platforms() {
        let vault = CredentialVault::default();
        assert!(vault.available_platforms().is_empty());
        assert!(matches!(
            vault.ensure_configured(),
            Err(CrosscastError::Config(ConfigError::NoPlatforms))
        ));
        assert!(matches!(
            vault.credentials_for(PlatformId::Mastodon),
            Err(CrosscastError::Config(ConfigError::NotConfigured(_)))
        ));
    }

    #[test]
    fn test_limits_follow_bluesky() {
        let both = vault(Some(bluesky()), Some(mastodon()));
        assert_eq!(both.post_length_limit(), 300);
        assert_eq!(both.image_size_limit(), Some(1_048_576));

        let mastodon_only = vault(None, Some(mastodon()));
        assert_eq!(mastodon_only.post_length_limit(), 1024);
        assert_eq!(mastodon_only.image_size_limit(), None);
    }

    #[test]
    fn test_disabled_platform() {
        let mut vault = vault(Some(bluesky()), Some(mastodon()));
        vault.disable(PlatformId::Bluesky);

        assert_eq!(vault.available_platforms(), vec![PlatformId::Mastodon]);
        assert!(!vault.is_available(PlatformId::Bluesky));
        assert!(vault.is_configured(PlatformId::Bluesky));
        // Text limit still follows the configured set, image limit does not
        assert_eq!(vault.post_length_limit(), 300);
        assert_eq!(vault.image_size_limit(), None);

        vault.disable(PlatformId::Mastodon);
        assert!(vault.ensure_configured().is_err());
    }

    #[test]
    fn test_credentials_for() {
        let vault = vault(Some(bluesky()), None);
        let credentials = vault.credentials_for(PlatformId::Bluesky).unwrap();
        assert_eq!(credentials.platform(), PlatformId::Bluesky);
        assert_eq!(credentials, Credentials::Bluesky(bluesky()));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?} {:?}", bluesky(), mastodon());
        assert!(!debug.contains("app-password"));
        assert!(!debug.contains("mastodon-token"));
        assert!(debug.contains("me@example.com"));
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, "correct horse battery staple");
        assert!(!store.exists());
        assert!(store.load().unwrap().is_empty());

        let stored = StoredCredentials {
            bluesky: Some(bluesky()),
            mastodon: Some(mastodon()),
            language: Some("pt".to_string()),
        };
        store.save(&stored).unwrap();
        assert!(store.exists());

        let raw = std::fs::read(store.path()).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("app-password"));

        assert_eq!(store.load().unwrap(), stored);
    }

    #[test]
    fn test_store_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        store(&dir, "correct horse battery staple")
            .save(&StoredCredentials {
                language: Some("en".to_string()),
                ..Default::default()
            })
            .unwrap();

        let result = store(&dir, "wrong password").load();
        assert!(matches!(
            result,
            Err(CrosscastError::Config(ConfigError::DecryptionFailed))
        ));
    }

    #[test]
    fn test_store_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, "correct horse battery staple");
        assert!(!store.delete().unwrap());

        store.save(&StoredCredentials::default()).unwrap();
        assert!(store.delete().unwrap());
        assert!(!store.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_store_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, "correct horse battery staple");
        store.save(&StoredCredentials::default()).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_store_rejects_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("elsewhere.age");
        std::fs::write(&target, b"not really age").unwrap();
        let link = dir.path().join("credentials.age");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let store = EncryptedFileStore::new(link, Zeroizing::new("password".to_string()));
        assert!(matches!(
            store.load(),
            Err(CrosscastError::Config(ConfigError::Symlink(_)))
        ));
        assert!(store.save(&StoredCredentials::default()).is_err());
        assert!(store.delete().is_err());
    }
}
