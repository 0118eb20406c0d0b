//! crosscast-post - Post the same text and images to Bluesky and Mastodon

use std::io::{BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use libcrosscast::language::normalize_language;
use libcrosscast::logging;
use libcrosscast::{
    Config, CrosscastError, DispatchResult, NoPrompt, PlatformId, PostRequest, PostingService,
    Prompter,
};
use tracing::{debug, info};
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
#[command(name = "crosscast-post")]
#[command(version)]
#[command(about = "Post the same text and images to Bluesky and Mastodon")]
#[command(long_about = "\
crosscast-post - Post the same text and images to Bluesky and Mastodon

DESCRIPTION:
    Posts once to every configured platform, concurrently. One platform
    failing never stops the others; every result is reported.

    Links and hashtags become Bluesky facets, and a post without images
    gets a link card for its first URL.

USAGE:
    crosscast-post \"Hello, world!\"
    crosscast-post post.txt --image cat.jpg --image dog.png
    echo \"Hello\" | crosscast-post --lang en --yes-to-all

CONFIGURATION:
    CROSSCAST_BSKY_AGENT, CROSSCAST_BSKY_EMAIL, CROSSCAST_BSKY_PASSWORD
    CROSSCAST_MASTODON_INSTANCE, CROSSCAST_MASTODON_TOKEN
    CROSSCAST_DEFAULT_LANG
    CROSSCAST_CREDENTIALS, CROSSCAST_MASTER_PASSWORD

    Anything not set in the environment is read from the encrypted
    credentials file written by `crosscast-creds config`.

EXIT CODES:
    0 - Posted to at least one platform
    1 - Every platform failed, or a configuration error
    2 - Authentication failed
    3 - Invalid post (too long, too many images, bad language...)
")]
struct Cli {
    /// Text to post, or the path of a text file (reads stdin if omitted)
    text: Option<String>,

    /// Image to attach (up to 4)
    #[arg(short, long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    /// Post language as a 2-letter code (skips detection)
    #[arg(short, long)]
    lang: Option<String>,

    /// Never ask for alt text or language confirmation
    #[arg(short, long)]
    yes_to_all: bool,

    #[arg(long)]
    skip_bluesky: bool,

    #[arg(long)]
    skip_mastodon: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_default(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<CrosscastError>()
                .map(CrosscastError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let interactive = !cli.yes_to_all && std::io::stdin().is_terminal();
    let text = read_text(cli.text.as_deref())?;

    let mut config = Config::from_env()?;
    load_stored_credentials(&mut config)?;

    let mut skip = Vec::new();
    if cli.skip_bluesky {
        skip.push(PlatformId::Bluesky);
    }
    if cli.skip_mastodon {
        skip.push(PlatformId::Mastodon);
    }

    let request = PostRequest {
        text,
        images: cli.images,
        lang: cli.lang,
        yes_to_all: cli.yes_to_all,
        skip,
    };

    let service = PostingService::from_config(&config)?;
    let service = if interactive {
        service.with_prompter(TerminalPrompter)
    } else {
        debug!("stdin is not a terminal, not prompting");
        service.with_prompter(NoPrompt)
    };

    let results = match service.post(request).await {
        Ok(results) => results,
        Err(CrosscastError::Validation(error)) => {
            if let Some(text) = error.recovered_text() {
                match save_draft(text) {
                    Ok(path) => eprintln!("Your text was saved to {}", path.display()),
                    Err(e) => eprintln!("Could not save your text: {:#}", e),
                }
            }
            return Err(CrosscastError::Validation(error).into());
        }
        Err(e) => return Err(e.into()),
    };

    print_results(&results, cli.format)?;

    if results.iter().any(DispatchResult::is_success) {
        Ok(0)
    } else {
        Ok(1)
    }
}

/// The positional argument, the contents of the file it names, or stdin
fn read_text(argument: Option<&str>) -> anyhow::Result<String> {
    let text = match argument {
        Some(argument) if Path::new(argument).is_file() => {
            info!("Reading post text from {}", argument);
            std::fs::read_to_string(argument)
                .with_context(|| format!("Failed to read {}", argument))?
        }
        Some(argument) => argument.to_string(),
        None => {
            if std::io::stdin().is_terminal() {
                bail!("No text given. Pass it as an argument, a file path, or through stdin");
            }
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };

    Ok(text.trim_end().to_string())
}

/// Complete the environment with the encrypted credentials file, if any
fn load_stored_credentials(config: &mut Config) -> anyhow::Result<()> {
    if !config.needs_stored_credentials() || !config.credentials_path.exists() {
        return Ok(());
    }

    let password = match config.master_password.clone() {
        Some(password) => password,
        None => Zeroizing::new(
            rpassword::prompt_password("Password for the crosscast credentials file: ")
                .context("Failed to read password")?,
        ),
    };

    let stored = config.credential_store(password).load()?;
    config.merge_stored(&stored);
    Ok(())
}

/// Keep a rejected text in a temporary file so it is not lost
fn save_draft(text: &str) -> anyhow::Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("crosscast-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(text.as_bytes())?;
    let (_, path) = file.keep()?;
    Ok(path)
}

fn print_results(results: &[DispatchResult], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    for result in results {
        let label = result
            .platform
            .parse::<PlatformId>()
            .map(|platform| platform.label())
            .unwrap_or_else(|_| result.platform.clone());
        match (result.url(), result.error()) {
            (Some(url), _) => println!("{} {}", label, url),
            (None, Some(error)) => eprintln!("{} {}", label, error),
            (None, None) => eprintln!("{} no result", label),
        }
    }
    Ok(())
}

/// Asks on stderr and reads answers from stdin
struct TerminalPrompter;

impl TerminalPrompter {
    fn ask(question: &str) -> Option<String> {
        eprint!("{}", question);
        std::io::stderr().flush().ok()?;

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(answer.trim().to_string()),
        }
    }

    fn ask_language() -> Option<String> {
        loop {
            let answer = Self::ask("Language of the post (2-letter code, empty to skip): ")?;
            if answer.is_empty() {
                return None;
            }
            match normalize_language(&answer) {
                Ok(lang) => return Some(lang),
                Err(_) => {
                    eprintln!("'{}' is not a 2-letter language code", answer);
                }
            }
        }
    }
}

impl Prompter for TerminalPrompter {
    fn alt_text(&self, image: &str) -> Option<String> {
        Self::ask(&format!("Alt text for {} (empty for none): ", image))
    }

    fn confirm_language(&self, detected: Option<&str>) -> Option<String> {
        let Some(detected) = detected else {
            return Self::ask_language();
        };

        let answer = Self::ask(&format!("Is the post language {}? [y/n] ", detected))?;
        if answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes") {
            None
        } else {
            Self::ask_language()
        }
    }
}
