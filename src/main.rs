use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use vkfetch::commands;
use vkfetch::config::{
    self, Config, ACCESS_TOKEN_ENV, DEFAULT_API_BASE_URL, DEFAULT_API_VERSION,
    DEFAULT_OUTPUT_FILE, DEFAULT_TIMEOUT_SECS,
};

#[derive(Parser, Debug)]
#[command(
    name = "vkfetch",
    version,
    about = "Download a VK user's profile, subscriptions and followers",
    long_about = "Fetches a user's profile, subscriptions and followers from the VK API \
                  and saves them together to a single JSON file"
)]
struct Cli {
    /// File to save the collected data to
    #[arg(
        long = "file_to_save",
        env = "VKFETCH_FILE_TO_SAVE",
        default_value = DEFAULT_OUTPUT_FILE
    )]
    file_to_save: PathBuf,

    /// Numeric ID of the VK user to collect data for
    #[arg(
        long = "user_id",
        env = "VKFETCH_USER_ID",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    user_id: u64,

    /// VK API access token
    #[arg(long, env = ACCESS_TOKEN_ENV, hide_env_values = true)]
    access_token: Option<String>,

    /// Base URL of the VK API
    #[arg(long, env = "VKFETCH_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// VK API version sent with every request
    #[arg(long, env = "VKFETCH_API_VERSION", default_value = DEFAULT_API_VERSION)]
    api_version: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let config = Config::new(self.access_token, self.user_id, self.file_to_save)?
            .with_api_base_url(&self.api_base_url)?
            .with_api_version(&self.api_version)?
            .with_request_timeout(Duration::from_secs(self.timeout_secs))?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file before clap reads them
    let env_file = config::load_env_file();

    // Parse command line arguments
    let args = Cli::parse();

    // Initialize logging
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(args, env_file).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Cli, env_file: Result<Option<PathBuf>, config::ConfigError>) -> Result<()> {
    match env_file.context("Failed to load environment")? {
        Some(path) => debug!("Loaded settings from {path}", path = path.display()),
        None => debug!("No .env file found, using process environment only"),
    }

    let config = args.into_config().context("Invalid configuration")?;
    debug!("Configuration: {config:?}");

    let saved_path = commands::fetch_user_data::execute(&config).await?;

    println!(
        "Data for user {user_id} saved to {path}",
        user_id = config.user_id(),
        path = saved_path.display()
    );

    Ok(())
}
