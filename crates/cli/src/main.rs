//! Artifact signer operator CLI.
//!
//! This tool provides commands for:
//! - Signing a message with the key registered for a public key
//! - Checking that a signer can be resolved for a public key
//! - Validating a single definition file

use std::path::PathBuf;
use std::str::FromStr;

use artifact_signer_core::provider::DirectoryBackedSignerProvider;
use artifact_signer_core::settings::Settings;
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

mod commands;
mod error;
mod logging;

use commands::MessageSource;
use error::CliError;

#[derive(Parser)]
#[command(name = "artifact-signer")]
#[command(about = "Sign artifacts with validator keys from a key store directory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML settings file
    #[arg(long, short, global = true, env = "ARTIFACT_SIGNER_CONFIG")]
    config: Option<PathBuf>,

    /// Key store directory, overriding the settings file
    #[arg(long, global = true, env = "ARTIFACT_SIGNER_KEY_STORE_PATH")]
    key_store_path: Option<String>,

    /// Maximum number of cached signers (0 disables caching)
    #[arg(long, global = true, env = "ARTIFACT_SIGNER_KEY_CACHE_LIMIT")]
    key_cache_limit: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "ARTIFACT_SIGNER_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a message and print the signature
    Sign {
        /// Public key identifying the signer
        #[arg(long, short)]
        identifier: String,

        #[command(flatten)]
        message: MessageArgs,
    },

    /// Resolve the signer for a public key and print it
    PublicKey {
        /// Public key identifying the signer
        #[arg(long, short)]
        identifier: String,
    },

    /// Parse a definition file and report its type
    Validate {
        /// Path to the definition file
        #[arg(long, short)]
        file: PathBuf,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct MessageArgs {
    /// Message to sign, as UTF-8 text
    #[arg(long)]
    message: Option<String>,

    /// Message to sign, hex encoded
    #[arg(long)]
    message_hex: Option<String>,

    /// File whose contents are signed
    #[arg(long)]
    message_file: Option<PathBuf>,
}

impl MessageArgs {
    fn source(self) -> Result<MessageSource, CliError> {
        match (self.message, self.message_hex, self.message_file) {
            (Some(text), None, None) => Ok(MessageSource::Text(text)),
            (None, Some(encoded), None) => Ok(MessageSource::Hex(encoded)),
            (None, None, Some(path)) => Ok(MessageSource::File(path)),
            _ => Err(CliError::Input(
                "exactly one of --message, --message-hex or --message-file is required".into(),
            )),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, CliError> {
    let loaded = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::from_toml(""),
    };
    let mut settings = loaded.map_err(|report| CliError::Settings(format!("{:?}", report)))?;

    if let Some(path) = &cli.key_store_path {
        settings.key_store.path = path.clone();
    }
    if let Some(limit) = cli.key_cache_limit {
        settings.key_store.cache_limit = limit;
    }
    if let Some(level) = &cli.log_level {
        LevelFilter::from_str(level)
            .map_err(|_| CliError::Settings(format!("unknown log level '{}'", level)))?;
        settings.logging.level = level.clone();
    }
    Ok(settings)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings = load_settings(&cli)?;
    logging::init_logger(settings.logging.level_filter())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let provider = DirectoryBackedSignerProvider::from_settings(&settings.key_store);
    log::debug!(
        "Using key store {} (*.{})",
        provider.directory().display(),
        provider.extension()
    );

    match cli.command {
        Commands::Sign {
            identifier,
            message,
        } => {
            let message = message.source()?.read()?;
            let signature = runtime.block_on(commands::sign(&provider, &identifier, &message))?;
            println!("{}", signature);
        }
        Commands::PublicKey { identifier } => {
            let public_key = runtime.block_on(commands::public_key(&provider, &identifier))?;
            println!("{}", public_key);
        }
        Commands::Validate { file } => {
            let kind = commands::validate(&file)?;
            println!("{}: valid {} definition", file.display(), kind);
        }
    }
    Ok(())
}
