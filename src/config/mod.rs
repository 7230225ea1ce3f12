//! Credentials and run configuration.
//!
//! [`Credentials`] and [`Config`] are validated with [`Validate`] before anything touches
//! the network.

use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::Url;
pub use validator::Validate;
use validator::ValidationError;

/// Environment variable holding the login email.
pub const EMAIL_ENV: &str = "BUNPRO_EMAIL";
/// Environment variable holding the login password.
pub const PASSWORD_ENV: &str = "BUNPRO_PASSWORD";
/// Environment variable overriding [`DEFAULT_BASE_URL`].
pub const BASE_URL_ENV: &str = "BUNPRO_BASE_URL";

/// Where Bunpro is served.
pub const DEFAULT_BASE_URL: &str = "https://bunpro.jp";
/// Default directory of the backup files, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Login credentials. Only kept in memory for the lifetime of the process.
#[non_exhaustive]
#[derive(Clone, Validate)]
pub struct Credentials {
    /// Login email, must look like an address.
    #[validate(email(message = "email is not a valid address"))]
    pub email: String,
    /// Login password, must not be empty.
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub password: String,
}

impl Credentials {
    /// Not validated yet, call [`Validate::validate`] before use.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

// never print the password
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything a run needs besides the [`Credentials`].
#[non_exhaustive]
#[derive(Debug, Clone, Validate)]
pub struct Config {
    /// Root of the Bunpro site, only `http` and `https` are accepted.
    #[validate(custom(function = "validate_base_url"))]
    pub base_url: Url,
    /// Directory holding the `deck_*.json` and `kanji_data.json` backups.
    #[validate(custom(function = "validate_data_dir"))]
    pub data_dir: PathBuf,
    /// Request timeout in seconds, `0` keeps the client default.
    pub timeout: u64,
}

fn validate_base_url(base_url: &Url) -> Result<(), ValidationError> {
    match base_url.scheme() {
        "http" | "https" if base_url.has_host() => Ok(()),
        _ => Err(ValidationError::new("base_url")
            .with_message("base url must be an http(s) url with a host".into())),
    }
}

fn validate_data_dir(data_dir: &Path) -> Result<(), ValidationError> {
    if data_dir.as_os_str().is_empty() {
        return Err(ValidationError::new("data_dir")
            .with_message("data directory must not be empty".into()));
    }
    Ok(())
}

impl Config {
    /// Not validated yet, call [`Validate::validate`] before use.
    pub fn new(base_url: Url, data_dir: impl Into<PathBuf>, timeout: u64) -> Self {
        Self {
            base_url,
            data_dir: data_dir.into(),
            timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            Url::parse(DEFAULT_BASE_URL).unwrap(),
            DEFAULT_DATA_DIR,
            0,
        )
    }
}
