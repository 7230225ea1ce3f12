//! A core module for command line interface.
//!
//! See [`Cli`] for more information.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Args, Command, Subcommand};
pub use clap::{CommandFactory, Parser};
use reqwest::Url;

use crate::config::{
    Config, Credentials, Validate, BASE_URL_ENV, DEFAULT_BASE_URL, DEFAULT_DATA_DIR, EMAIL_ENV,
    PASSWORD_ENV,
};
use crate::deck::DeckPath;

/// [`clap`] command line interface.
///
/// Deck paths are parsed with [`DeckPath`]'s `FromStr`, so a malformed deck is rejected
/// here, before any request is sent.
/// Credentials are taken from the arguments, then the environment
/// (`.env` has to be loaded before [`Self::parse`]), and are checked by [`Self::credentials`].
///
/// # Example
///
/// ```no_run
/// use bunpro_backup::cli::{Cli, CommandFactory as _, Parser as _};
///
/// let cli = Cli::parse();
/// let credentials = cli.credentials(&mut Cli::command())?;
/// let config = cli.config(&mut Cli::command())?;
///
/// Ok::<(), clap::Error>(())
/// ```
#[non_exhaustive]
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// What to do once logged in.
    #[command(subcommand)]
    pub command: Commands,

    /// Bunpro login email
    #[arg(short, long, global = true, env = EMAIL_ENV)]
    pub email: Option<String>,

    /// Bunpro login password
    #[arg(short, long, global = true, env = PASSWORD_ENV, hide_env_values = true)]
    pub password: Option<String>,

    /// Enable INFO logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Request timeout in seconds, 0 means no timeout
    #[arg(long, global = true, value_name = "SECS", default_value_t = 0)]
    pub timeout: u64,

    /// Root of the Bunpro site, only changed to test against another server
    #[arg(long, global = true, hide = true, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: Url,
}

/// The subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Scrape the given decks and save their SRS data to JSON files
    Backup {
        /// Deck path or full URL, e.g. /decks/nn10ai/Bunpro-N5-Grammar
        #[arg(value_name = "DECK", required = true)]
        decks: Vec<DeckPath>,

        /// Data directory options.
        #[command(flatten)]
        data: DataArgs,
    },
    /// Restore SRS streaks from previously saved JSON files
    Restore {
        /// Backup files to restore, all deck backups in the data directory if omitted
        #[arg(value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Data directory options.
        #[command(flatten)]
        data: DataArgs,
    },
}

/// Options shared by both subcommands.
#[non_exhaustive]
#[derive(Args)]
pub struct DataArgs {
    /// Directory of the backup files
    #[arg(long, value_name = "DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Do not back up or restore the known kanji
    #[arg(long)]
    pub skip_kanji: bool,
}

impl Commands {
    /// The [`DataArgs`] of either subcommand.
    pub fn data(&self) -> &DataArgs {
        match self {
            Self::Backup { data, .. } | Self::Restore { data, .. } => data,
        }
    }

    /// Whether the known kanji are handled too.
    ///
    /// Never with `--skip-kanji`. A restore of explicitly given files only restores those files.
    pub fn with_kanji(&self) -> bool {
        match self {
            Self::Backup { data, .. } => !data.skip_kanji,
            Self::Restore { files, data } => !data.skip_kanji && files.is_empty(),
        }
    }
}

impl Cli {
    /// Validate the credentials given by arguments or the environment.
    ///
    /// # Errors
    ///
    /// If the email or password is missing, or invalid, a [`clap::Error`] is returned,
    /// which can be printed and exited with like a parsing error.
    pub fn credentials(&self, cmd: &mut Command) -> Result<Credentials, clap::Error> {
        let (Some(email), Some(password)) = (&self.email, &self.password) else {
            return Err(cmd.error(
                ErrorKind::MissingRequiredArgument,
                format!(
                    "Missing credentials. Provide --email/--password \
                    or set {EMAIL_ENV} and {PASSWORD_ENV} in env/.env."
                ),
            ));
        };

        let credentials = Credentials::new(email, password);
        match credentials.validate() {
            Ok(_) => Ok(credentials),
            Err(err) => Err(cmd.error(ErrorKind::ValueValidation, err)),
        }
    }

    /// Build and validate the [`Config`] of this run.
    ///
    /// # Errors
    ///
    /// If the base url or the data directory is invalid, a [`clap::Error`] is returned.
    pub fn config(&self, cmd: &mut Command) -> Result<Config, clap::Error> {
        let config = Config::new(
            self.base_url.clone(),
            self.command.data().data_dir.clone(),
            self.timeout,
        );
        match config.validate() {
            Ok(_) => Ok(config),
            Err(err) => Err(cmd.error(ErrorKind::ValueValidation, err)),
        }
    }
}
