use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "https://api.vk.com/method/";
pub const DEFAULT_API_VERSION: &str = "5.131";
pub const DEFAULT_OUTPUT_FILE: &str = "vk_data.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable holding the VK access token
pub const ACCESS_TOKEN_ENV: &str = "ACCESS_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No access token provided. Set ACCESS_TOKEN in the environment or .env file, or pass --access-token")]
    MissingAccessToken,

    #[error("User ID must be a positive integer, got {0}")]
    InvalidUserId(u64),

    #[error("Output file path is empty")]
    EmptyOutputPath,

    #[error("Invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("API version must not be empty")]
    InvalidApiVersion,

    #[error("Request timeout must be greater than zero")]
    InvalidTimeout,

    #[error("Failed to load settings file")]
    EnvFile(#[source] dotenv::Error),
}

/// Loads `.env` from the working directory (or one of its parents).
///
/// Returns the path that was loaded, or `None` when there is no such file.
pub fn load_env_file() -> Result<Option<PathBuf>, ConfigError> {
    match dotenv::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(dotenv::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::EnvFile(e)),
    }
}

/// Runtime configuration, built once at startup and passed by reference.
#[derive(Clone)]
pub struct Config {
    access_token: String,
    user_id: u64,
    output_path: PathBuf,
    api_base_url: Url,
    api_version: String,
    request_timeout: Duration,
}

impl Config {
    pub fn new(
        access_token: Option<String>,
        user_id: u64,
        output_path: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let access_token = access_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingAccessToken)?;

        if user_id == 0 {
            return Err(ConfigError::InvalidUserId(user_id));
        }

        let output_path = output_path.into();
        if output_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputPath);
        }

        let api_base_url = parse_base_url(DEFAULT_API_BASE_URL)?;

        Ok(Self {
            access_token,
            user_id,
            output_path,
            api_base_url,
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_api_base_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.api_base_url = parse_base_url(url)?;
        debug!("Using API base URL {url}", url = self.api_base_url);
        Ok(self)
    }

    pub fn with_api_version(mut self, version: &str) -> Result<Self, ConfigError> {
        let version = version.trim();
        if version.is_empty() {
            return Err(ConfigError::InvalidApiVersion);
        }
        self.api_version = version.to_string();
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        self.request_timeout = timeout;
        Ok(self)
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

// Keeps the token out of logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("access_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("output_path", &self.output_path)
            .field("api_base_url", &self.api_base_url.as_str())
            .field("api_version", &self.api_version)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Parse an http(s) base URL, making sure it ends with `/` so that
/// method names join onto it instead of replacing its last segment.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };

    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("URL cannot be used as a base".to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("URL must not carry a query or fragment".to_string()));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}
