use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use log::LevelFilter;
use tokio::runtime::Runtime;
use tokio::signal;

use bunpro_backup::api::Session;
use bunpro_backup::backup::{backup_deck, backup_kanji};
use bunpro_backup::cli::{Cli, CommandFactory, Commands, Parser};
use bunpro_backup::config::{Config, Credentials};
use bunpro_backup::deck::DeckPath;
use bunpro_backup::restore::{restore_file, restore_kanji_if_present, RestoreReport};
use bunpro_backup::store;
use bunpro_backup::tool::build_spinner;

const SPINNER_TICK_SECS: f32 = 0.1;

/// `warn` by default, `info` with `--verbose`, `RUST_LOG` still wins.
fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

#[inline]
async fn login(config: &Config, credentials: &Credentials) -> anyhow::Result<Session> {
    let spinner = build_spinner();
    spinner.set_message("Logging in to Bunpro...");
    spinner.enable_steady_tick(Duration::from_secs_f32(SPINNER_TICK_SECS));
    let session = Session::login(config.base_url.clone(), config.timeout, credentials)
        .await
        .context("failed to log in")?;
    spinner.finish_with_message("Logged in successfully!");
    Ok(session)
}

async fn run_backup(
    session: &Session,
    config: &Config,
    decks: &[DeckPath],
    with_kanji: bool,
) -> anyhow::Result<ExitCode> {
    let data_dir = &config.data_dir;
    for deck in decks {
        let path = backup_deck(session, deck, data_dir)
            .await
            .with_context(|| format!("failed to back up {deck}"))?;
        println!("Backup of {deck} saved to {}", path.display());
    }

    if with_kanji {
        let path = backup_kanji(session, data_dir)
            .await
            .context("failed to back up known kanji")?;
        println!("Backup of known kanji saved to {}", path.display());
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_restore(
    session: &Session,
    config: &Config,
    files: Vec<PathBuf>,
    with_kanji: bool,
) -> anyhow::Result<ExitCode> {
    let data_dir = &config.data_dir;
    let files = if files.is_empty() {
        store::deck_files(data_dir)
            .await
            .context("failed to list backup files")?
    } else {
        files
    };

    // HACK: This is not considered an error, so we just go on with the kanji.
    if files.is_empty() {
        println!("There is no deck backup found in {}", data_dir.display());
    }

    let mut report = RestoreReport::default();
    for file in &files {
        report += restore_file(session, file)
            .await
            .with_context(|| format!("failed to restore {}", file.display()))?;
    }

    if with_kanji {
        let restored = restore_kanji_if_present(session, data_dir)
            .await
            .context("failed to restore known kanji")?;
        if let Some(restored) = restored {
            println!("Restored {restored} known kanji");
        }
    }

    let RestoreReport {
        done,
        skipped,
        failed,
        ..
    } = report;
    println!("Restore finished: {done} restored, {skipped} skipped, {failed} failed");

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[inline]
async fn async_main(
    cli: Cli,
    config: Config,
    credentials: Credentials,
) -> anyhow::Result<ExitCode> {
    let with_kanji = cli.command.with_kanji();
    let session = login(&config, &credentials).await?;
    // the password is not needed anymore
    drop(credentials);

    match cli.command {
        Commands::Backup { decks, .. } => run_backup(&session, &config, &decks, with_kanji).await,
        Commands::Restore { files, .. } => {
            run_restore(&session, &config, files, with_kanji).await
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    // `.env` must be loaded before parsing, `clap` reads the credentials from the environment.
    dotenv().ok();

    // here, if parse fails, the program will be `abort`ed, and no `Drop` will be called,
    // but it's okay, because we don't need to clean up anything.
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let checked = cli
        .credentials(&mut Cli::command())
        .and_then(|credentials| Ok((credentials, cli.config(&mut Cli::command())?)));
    let (credentials, config) = match checked {
        Ok(checked) => checked,
        Err(err) => {
            let _ = err.print();
            return Ok(ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(2)));
        }
    };

    let runtime = Runtime::new().context("failed to build tokio runtime")?;
    let exit_code = runtime.block_on(async {
        tokio::select! {
            result = async_main(cli, config, credentials) => {result},
            result = signal::ctrl_c() => {
                result.expect("failed to listen for ctrl-c signal");
                println!("Ctrl-C received, exiting...");
                Ok(ExitCode::FAILURE)
            },
        }
    })?;

    Ok(exit_code)
}
