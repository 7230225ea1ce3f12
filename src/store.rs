//! Backup files on the local disk.
//!
//! Every deck is stored as `deck_<slug>.json`, the known kanji as [`KANJI_FILE_NAME`],
//! all inside one data directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs::{create_dir_all, File};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::deck::DeckPath;

/// File name prefix of the deck backups.
pub const DECK_FILE_PREFIX: &str = "deck_";
/// File name of the known kanji backup.
pub const KANJI_FILE_NAME: &str = "kanji_data.json";
const EXTENSION: &str = "json";

/// Errors of reading or writing backup files.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// The file system refused.
    #[error("failed to access `{}`", path.display())]
    Io {
        /// The file or directory accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not the JSON we expect, or the data could not be serialized.
    #[error("`{}` is not a valid backup", path.display())]
    Json {
        /// The backup file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_owned();
        move |source| Self::Io { path, source }
    }

    fn json(path: &Path) -> impl FnOnce(serde_json::Error) -> Self {
        let path = path.to_owned();
        move |source| Self::Json { path, source }
    }
}

/// `<data_dir>/deck_<slug>.json`, see [`DeckPath::slug`].
pub fn deck_file_path(data_dir: impl AsRef<Path>, deck: &DeckPath) -> PathBuf {
    data_dir
        .as_ref()
        .join(format!("{DECK_FILE_PREFIX}{}.{EXTENSION}", deck.slug()))
}

/// `<data_dir>/kanji_data.json`.
pub fn kanji_file_path(data_dir: impl AsRef<Path>) -> PathBuf {
    data_dir.as_ref().join(KANJI_FILE_NAME)
}

/// Write `data` as pretty printed JSON, creating the parent directory if needed.
///
/// Non-ASCII text (e.g. Japanese grammar point titles) is written as is, not escaped.
pub async fn save_json<T>(path: impl AsRef<Path>, data: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let path = path.as_ref();
    let content = serde_json::to_vec_pretty(data).map_err(StoreError::json(path))?;

    if let Some(parent) = path.parent() {
        create_dir_all(parent).await.map_err(StoreError::io(parent))?;
    }
    let mut file_buf = BufWriter::new(File::create(path).await.map_err(StoreError::io(path))?);
    file_buf
        .write_all(&content)
        .await
        .map_err(StoreError::io(path))?;
    file_buf.flush().await.map_err(StoreError::io(path))?;

    log::debug!("wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

/// Read a JSON file written by [`save_json`] (or by older versions of this tool).
pub async fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, StoreError> {
    let path = path.as_ref();
    let content = tokio::fs::read(path).await.map_err(StoreError::io(path))?;
    serde_json::from_slice(&content).map_err(StoreError::json(path))
}

/// Whether `path` exists.
///
/// Unlike a plain `Path::exists`, an error other than "not found" (e.g. permission denied)
/// is returned instead of being taken as "no such file".
pub async fn exists(path: impl AsRef<Path>) -> Result<bool, StoreError> {
    let path = path.as_ref();
    tokio::fs::try_exists(path)
        .await
        .map_err(StoreError::io(path))
}

/// All `deck_*.json` files of `data_dir`, sorted by name.
///
/// A missing `data_dir` is not an error, there is just nothing to restore.
pub async fn deck_files(data_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, StoreError> {
    let data_dir = data_dir.as_ref();

    let mut entries = match tokio::fs::read_dir(data_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::with_capacity(0)),
        Err(err) => return Err(StoreError::io(data_dir)(err)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(StoreError::io(data_dir))?
    {
        let path = entry.path();
        let is_deck_file = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(DECK_FILE_PREFIX))
            && path.extension().is_some_and(|ext| ext == EXTENSION);
        let file_type = entry.file_type().await.map_err(StoreError::io(&path))?;
        if is_deck_file && file_type.is_file() {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}
