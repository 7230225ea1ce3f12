//! Back up the SRS progress of decks and the known kanji.
//!
//! [`extract_deck`] collects the [`CardRecord`]s of a deck through a [`Frontend`],
//! [`backup_deck`] additionally writes them to the deck's backup file.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::api::{ApiError, Frontend};
use crate::deck::{parse, CardRecord, DeckError, DeckPath};
use crate::store::{self, StoreError};
use crate::tool::build_process_bar;

/// Errors of a deck or kanji backup. Nothing is written when one occurs.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BackupError {
    /// A deck or grammar point page could not be fetched.
    #[error("failed to fetch `{url}`")]
    Fetch {
        /// The page.
        url: String,
        /// The underlying error.
        #[source]
        source: ApiError,
    },
    /// The known kanji could not be read.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// A page is not what we expect.
    #[error(transparent)]
    Deck(#[from] DeckError),
    /// The backup file could not be written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[inline]
async fn fetch(frontend: &impl Frontend, url: &str) -> Result<String, BackupError> {
    frontend
        .page(url)
        .await
        .map_err(|source| BackupError::Fetch {
            url: url.to_owned(),
            source,
        })
}

/// Visit the deck page and then the page of every grammar point on it, in order.
///
/// # Errors
///
/// Any failed request or unrecognized page fails the whole deck.
/// See [`DeckError`] for what is expected from the pages.
pub async fn extract_deck<F: Frontend>(
    frontend: &F,
    deck: &DeckPath,
) -> Result<Vec<CardRecord>, BackupError> {
    log::info!("Starting backup for {deck}");

    let deck_page = fetch(frontend, deck.as_str()).await?;
    let cards = parse::deck_page(&deck_page)?;
    log::info!("Found {} grammar points in {deck}", cards.len());

    let process_bar = build_process_bar(cards.len().try_into().unwrap(), deck.slug());
    let mut records = Vec::with_capacity(cards.len());
    for parse::CardSummary { url, srs } in cards {
        let deck_id = parse::deck_id(&url)?;
        let card_page = fetch(frontend, &url).await?;
        let reviewable_id = parse::reviewable_id(&card_page, &url)?;

        records.push(CardRecord::new(url, srs, reviewable_id, deck_id));
        process_bar.inc(1);
    }
    process_bar.finish();

    Ok(records)
}

/// [`extract_deck`] and save the records to [`store::deck_file_path`].
///
/// Nothing is written if the extraction fails. Returns the path of the backup file.
pub async fn backup_deck<F: Frontend>(
    frontend: &F,
    deck: &DeckPath,
    data_dir: impl AsRef<Path>,
) -> Result<PathBuf, BackupError> {
    let records = extract_deck(frontend, deck).await?;

    let path = store::deck_file_path(data_dir, deck);
    store::save_json(&path, &records).await?;
    log::info!("Saved {} grammar points to {}", records.len(), path.display());

    Ok(path)
}

/// Save the known kanji to [`store::kanji_file_path`]. Returns the path of the backup file.
pub async fn backup_kanji<F: Frontend>(
    frontend: &F,
    data_dir: impl AsRef<Path>,
) -> Result<PathBuf, BackupError> {
    log::info!("Starting backup for known kanji");

    // adding nothing just reads the current state
    let known_kanji = frontend.add_known_kanji(&[]).await?;

    let path = store::kanji_file_path(data_dir);
    store::save_json(&path, &known_kanji).await?;
    log::info!(
        "Saved {} known kanji to {}",
        known_kanji.known_kanji.len(),
        path.display()
    );

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::api::data::KnownKanji;
    use crate::api::fake::{FakeFrontend, DECK_ID, DECK_PATH};

    fn deck() -> DeckPath {
        DECK_PATH.parse().unwrap()
    }

    #[tokio::test]
    async fn test_extract_deck() -> anyhow::Result<()> {
        let frontend = FakeFrontend::with_streaks([(1, Some(3)), (2, None), (3, Some(0))]);

        let records = extract_deck(&frontend, &deck()).await?;
        assert_eq!(
            records,
            [
                CardRecord::new(
                    format!("/grammar_points/1?deck_id={DECK_ID}"),
                    Some("SRS 3".into()),
                    1,
                    DECK_ID
                ),
                CardRecord::new(format!("/grammar_points/2?deck_id={DECK_ID}"), None, 2, DECK_ID),
                CardRecord::new(
                    format!("/grammar_points/3?deck_id={DECK_ID}"),
                    Some("SRS 0".into()),
                    3,
                    DECK_ID
                ),
            ]
        );
        // the deck page and one page per grammar point
        assert_eq!(*frontend.requests.borrow(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_deck_is_an_error() {
        let frontend = FakeFrontend::default();

        let temp_dir = tempfile::tempdir().unwrap();
        let result = backup_deck(&frontend, &deck(), temp_dir.path()).await;
        assert!(matches!(result, Err(BackupError::Deck(DeckError::NoCards))));
        // nothing is written
        assert!(store::deck_files(temp_dir.path()).await.unwrap().is_empty());

        temp_dir.close().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_deck_is_an_error() {
        let frontend = FakeFrontend::with_streaks([(1, Some(3))]);
        let other: DeckPath = "/decks/xyz/Other".parse().unwrap();

        let result = extract_deck(&frontend, &other).await;
        assert!(matches!(result, Err(BackupError::Fetch { url, .. }) if url == "/decks/xyz/Other"));
    }

    #[tokio::test]
    async fn test_backup_deck() -> anyhow::Result<()> {
        let frontend = FakeFrontend::with_streaks([(1, Some(3)), (2, None)]);
        let temp_dir = tempfile::tempdir()?;

        let path = backup_deck(&frontend, &deck(), temp_dir.path()).await?;
        assert_eq!(path, temp_dir.path().join("deck_bunpro-n5-grammar.json"));

        let saved: Vec<CardRecord> = store::load_json(&path).await?;
        assert_eq!(saved, extract_deck(&frontend, &deck()).await?);

        temp_dir.close()?;
        Ok(())
    }

    #[tokio::test]
    async fn test_backup_kanji() -> anyhow::Result<()> {
        let frontend = FakeFrontend::default();
        frontend
            .kanji
            .borrow_mut()
            .extend([String::from("日"), String::from("本")]);
        let temp_dir = tempfile::tempdir()?;

        let path = backup_kanji(&frontend, temp_dir.path()).await?;
        assert_eq!(path, temp_dir.path().join("kanji_data.json"));

        let saved: KnownKanji = store::load_json(&path).await?;
        assert_eq!(saved.kanjis(), ["日", "本"]);
        // reading must not add anything
        assert_eq!(frontend.kanji.borrow().len(), 2);

        temp_dir.close()?;
        Ok(())
    }
}
