//! Encrypted credentials file combined with environment configuration

use anyhow::Result;
use libcrosscast::config::Config;
use libcrosscast::credentials::{
    BlueskyCredentials, CredentialVault, MastodonCredentials, StoredCredentials,
};
use libcrosscast::error::{ConfigError, CrosscastError};
use libcrosscast::types::PlatformId;
use tempfile::TempDir;
use zeroize::Zeroizing;

fn config_with(path: &std::path::Path, pairs: &[(&str, &str)]) -> Config {
    let path = path.to_string_lossy().to_string();
    let pairs: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_vars(move |name| {
        if name == "CROSSCAST_CREDENTIALS" {
            return Some(path.clone());
        }
        pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    })
    .expect("valid config")
}

fn stored() -> StoredCredentials {
    StoredCredentials {
        bluesky: Some(BlueskyCredentials::new(
            "https://bsky.social",
            "stored@example.com",
            "stored-app-password",
        )),
        mastodon: Some(MastodonCredentials::new("tech.lgbt", "stored-token")),
        language: Some("pt".to_string()),
    }
}

#[test]
fn test_stored_credentials_complete_the_environment() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("nested").join("credentials.age");

    let mut config = config_with(&path, &[("CROSSCAST_MASTODON_TOKEN", "env-token")]);
    assert!(config.needs_stored_credentials());

    let store = config.credential_store(Zeroizing::new("correct horse".to_string()));
    store.save(&stored())?;
    assert!(store.exists());

    config.merge_stored(&store.load()?);

    let bluesky = config.bluesky.as_ref().expect("bluesky from the store");
    assert_eq!(bluesky.identifier, "stored@example.com");
    let mastodon = config.mastodon.as_ref().expect("mastodon from the environment");
    assert_eq!(mastodon.token, "env-token");
    assert_eq!(mastodon.instance_url, "https://mastodon.social");
    assert_eq!(config.default_language.as_deref(), Some("pt"));

    let vault = CredentialVault::from_config(&config);
    assert_eq!(
        vault.available_platforms(),
        vec![PlatformId::Bluesky, PlatformId::Mastodon]
    );
    Ok(())
}

#[test]
fn test_file_does_not_contain_plaintext() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("credentials.age");
    let config = config_with(&path, &[]);

    config
        .credential_store(Zeroizing::new("correct horse".to_string()))
        .save(&stored())?;

    let raw = std::fs::read(&path)?;
    let raw = String::from_utf8_lossy(&raw);
    assert!(raw.starts_with("age-encryption.org/v1"));
    assert!(!raw.contains("stored-token"));
    assert!(!raw.contains("stored@example.com"));
    Ok(())
}

#[test]
fn test_wrong_password_is_a_config_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("credentials.age");
    let config = config_with(&path, &[]);

    config
        .credential_store(Zeroizing::new("correct horse".to_string()))
        .save(&stored())?;
    let err = config
        .credential_store(Zeroizing::new("battery staple".to_string()))
        .load()
        .unwrap_err();

    assert!(matches!(
        err,
        CrosscastError::Config(ConfigError::DecryptionFailed)
    ));
    assert_eq!(err.exit_code(), 1);
    Ok(())
}

#[test]
fn test_missing_file_reads_as_empty() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_with(&dir.path().join("absent.age"), &[]);

    let store = config.credential_store(Zeroizing::new("whatever".to_string()));
    assert!(!store.exists());
    assert!(store.load()?.is_empty());
    assert!(!store.delete()?);
    Ok(())
}
