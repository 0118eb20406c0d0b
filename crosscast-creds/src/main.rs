//! crosscast-creds - Manage the encrypted crosscast credentials file

use std::io::{self, IsTerminal, Read, Write};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use libcrosscast::config::{Config, DEFAULT_BSKY_AGENT, DEFAULT_MASTODON_INSTANCE};
use libcrosscast::credentials::{
    BlueskyCredentials, EncryptedFileStore, MastodonCredentials, StoredCredentials,
};
use libcrosscast::language::normalize_language;
use libcrosscast::{logging, CrosscastError, PlatformId};
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Shorter passwords are accepted with a warning
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Parser)]
#[command(name = "crosscast-creds")]
#[command(version)]
#[command(about = "Manage the encrypted crosscast credentials file", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Save Bluesky and Mastodon credentials and the preferred language
    Config {
        /// Read a TOML document from stdin instead of asking (for automation)
        #[arg(long)]
        stdin: bool,
    },

    /// Delete the credentials file
    Clean {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show which platforms are configured, without showing secrets
    Status,
}

fn main() {
    let cli = Cli::parse();
    logging::init_default(cli.verbose);

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<CrosscastError>()
            .map(CrosscastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn run_command(command: Commands) -> Result<()> {
    let config = Config::from_env()?;
    match command {
        Commands::Config { stdin } => configure(&config, stdin),
        Commands::Clean { force } => clean(&config, force),
        Commands::Status => status(&config),
    }
}

fn configure(config: &Config, use_stdin: bool) -> Result<()> {
    let creating = !config.credentials_path.exists();
    let store = config.credential_store(master_password(config, creating && !use_stdin)?);

    let stored = if use_stdin {
        let mut buffer = Zeroizing::new(String::new());
        io::stdin().read_to_string(&mut buffer)?;
        parse_stored(&buffer)?
    } else {
        if !io::stdin().is_terminal() {
            bail!("Not a TTY. Use --stdin to read credentials from stdin for automation.");
        }
        ask_stored(&store.load()?)?
    };

    store.save(&stored)?;
    info!("Saved credentials to {}", store.path().display());
    println!("✓ Saved credentials to {}", store.path().display());
    for platform in PlatformId::ALL {
        if is_stored(&stored, platform) {
            println!("  {} configured", platform.label());
        }
    }
    Ok(())
}

/// Parse a TOML document shaped like the credentials file
fn parse_stored(document: &str) -> Result<StoredCredentials> {
    let parsed: StoredCredentials =
        toml::from_str(document).context("Invalid credentials document")?;

    Ok(StoredCredentials {
        bluesky: parsed.bluesky.as_ref().map(|b| {
            BlueskyCredentials::new(&b.agent_url, b.identifier.clone(), b.secret.clone())
        }),
        mastodon: parsed
            .mastodon
            .as_ref()
            .map(|m| MastodonCredentials::new(&m.instance_url, m.token.clone())),
        language: parsed
            .language
            .as_deref()
            .map(normalize_language)
            .transpose()?,
    })
}

fn ask_stored(current: &StoredCredentials) -> Result<StoredCredentials> {
    let mut stored = current.clone();

    if confirm(&format!("Configure {}?", PlatformId::Bluesky.label()))? {
        let agent = ask_with_default(
            "Bluesky server",
            current
                .bluesky
                .as_ref()
                .map_or(DEFAULT_BSKY_AGENT, |b| b.agent_url.as_str()),
        )?;
        let identifier = ask_with_default(
            "Bluesky handle or email",
            current.bluesky.as_ref().map_or("", |b| b.identifier.as_str()),
        )?;
        let secret = Zeroizing::new(rpassword::prompt_password("Bluesky app password: ")?);
        stored.bluesky = Some(BlueskyCredentials::new(agent, identifier, secret.as_str()));
    }

    if confirm(&format!("Configure {}?", PlatformId::Mastodon.label()))? {
        let instance = ask_with_default(
            "Mastodon instance",
            current
                .mastodon
                .as_ref()
                .map_or(DEFAULT_MASTODON_INSTANCE, |m| m.instance_url.as_str()),
        )?;
        let token = Zeroizing::new(rpassword::prompt_password("Mastodon access token: ")?);
        stored.mastodon = Some(MastodonCredentials::new(instance, token.as_str()));
    }

    loop {
        let language = ask_with_default(
            "Preferred language (2-letter code, '-' for none)",
            current.language.as_deref().unwrap_or("-"),
        )?;
        if language == "-" {
            stored.language = None;
            break;
        }
        match normalize_language(&language) {
            Ok(language) => {
                stored.language = Some(language);
                break;
            }
            Err(e) => eprintln!("{}", e),
        }
    }

    Ok(stored)
}

fn clean(config: &Config, force: bool) -> Result<()> {
    let path = &config.credentials_path;
    if !path.exists() {
        println!("No credentials file at {}", path.display());
        return Ok(());
    }

    if !force {
        if !io::stdin().is_terminal() {
            bail!("Not a TTY. Use --force to delete without confirmation.");
        }
        print!(
            "Delete {}? Type 'yes' to confirm (or anything else to cancel): ",
            path.display()
        );
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if input.trim() != "yes" {
            println!("Cancelled");
            return Ok(());
        }
    }

    // Deleting does not need the password
    let store = EncryptedFileStore::new(path.clone(), Zeroizing::new(String::new()));
    if store.delete()? {
        println!("✓ Deleted {}", path.display());
    }
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let path = &config.credentials_path;
    let stored = if path.exists() {
        println!("Credentials file: {}", path.display());
        match unlock_for_status(config)? {
            Some(store) => Some(store.load()?),
            None => {
                println!("  (locked: set CROSSCAST_MASTER_PASSWORD to read it)");
                None
            }
        }
    } else {
        println!("Credentials file: {} (not found)", path.display());
        None
    };
    println!();

    for platform in PlatformId::ALL {
        let from_env = match platform {
            PlatformId::Bluesky => config.bluesky.as_ref().map(describe_bluesky),
            PlatformId::Mastodon => config.mastodon.as_ref().map(|m| m.instance_url.clone()),
        };
        let from_file = stored.as_ref().and_then(|stored| match platform {
            PlatformId::Bluesky => stored.bluesky.as_ref().map(describe_bluesky),
            PlatformId::Mastodon => stored.mastodon.as_ref().map(|m| m.instance_url.clone()),
        });

        let line = match (from_env, from_file) {
            (Some(who), _) => format!("configured ({}, from the environment)", who),
            (None, Some(who)) => format!("configured ({}, from the credentials file)", who),
            (None, None) => "not configured".to_string(),
        };
        println!("{}: {}", platform.label(), line);
    }

    let language = config
        .default_language
        .clone()
        .or_else(|| stored.as_ref().and_then(|s| s.language.clone()));
    println!(
        "Preferred language: {}",
        language.as_deref().unwrap_or("auto-detect")
    );
    Ok(())
}

fn describe_bluesky(credentials: &BlueskyCredentials) -> String {
    format!("{} on {}", credentials.identifier, credentials.agent_url)
}

fn is_stored(stored: &StoredCredentials, platform: PlatformId) -> bool {
    match platform {
        PlatformId::Bluesky => stored.bluesky.is_some(),
        PlatformId::Mastodon => stored.mastodon.is_some(),
    }
}

/// The store for `status`, prompting only on a terminal
fn unlock_for_status(config: &Config) -> Result<Option<EncryptedFileStore>> {
    if config.master_password.is_none() && !io::stdin().is_terminal() {
        return Ok(None);
    }
    Ok(Some(config.credential_store(master_password(config, false)?)))
}

/// From `CROSSCAST_MASTER_PASSWORD`, or prompted (twice for a new file)
fn master_password(config: &Config, confirm_new: bool) -> Result<Zeroizing<String>> {
    if let Some(password) = &config.master_password {
        return Ok(password.clone());
    }

    let password = Zeroizing::new(rpassword::prompt_password(
        "Password for the crosscast credentials file: ",
    )?);
    if confirm_new {
        let again = Zeroizing::new(rpassword::prompt_password("Repeat the password: ")?);
        if *again != *password {
            bail!("Passwords do not match");
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            warn!(
                "Password is shorter than {} characters; consider a longer one",
                MIN_PASSWORD_LENGTH
            );
        }
    }
    Ok(password)
}

fn confirm(question: &str) -> Result<bool> {
    let answer = ask(&format!("{} [y/n] ", question))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

fn ask_with_default(question: &str, default: &str) -> Result<String> {
    let answer = if default.is_empty() {
        ask(&format!("{}: ", question))?
    } else {
        ask(&format!("{} [{}]: ", question, default))?
    };
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer
    })
}

fn ask(question: &str) -> Result<String> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        bail!("Unexpected end of input");
    }
    Ok(input.trim().to_string())
}
