//! Replay a backup through Bunpro's frontend endpoints.
//!
//! Every [`CardRecord`] is restored on its own: a failed card is reported and counted
//! in the [`RestoreReport`], then the next card is tried. Nothing is rolled back.

use std::ops::AddAssign;
use std::path::Path;

use anyhow::Context;
use indicatif::ProgressBar;
use thiserror::Error;

use crate::api::data::KnownKanji;
use crate::api::{ApiError, Frontend};
use crate::deck::CardRecord;
use crate::store::{self, StoreError};
use crate::tool::build_process_bar;

/// Errors that stop a restore. Failed cards are not among them.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RestoreError {
    /// Bunpro refused a request that is not tied to a single card.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The backup could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The result of restoring a single card.
enum SingleRestoreResult {
    /// The streak was set.
    Done,
    /// The card has never been studied, so there is nothing to restore.
    Skipped,
}

/// How many cards were restored, skipped or failed.
#[non_exhaustive]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    /// Streak set.
    pub done: u64,
    /// Never studied.
    pub skipped: u64,
    /// Printed and left as is.
    pub failed: u64,
}

impl RestoreReport {
    /// Every card seen.
    pub fn total(&self) -> u64 {
        self.done + self.skipped + self.failed
    }

    /// No card failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl AddAssign for RestoreReport {
    fn add_assign(&mut self, rhs: Self) {
        self.done += rhs.done;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

/// Return the formated restore status message
#[inline]
fn pb_msg(report: &RestoreReport) -> String {
    let RestoreReport {
        done,
        skipped,
        failed,
    } = report;
    format!("[done:{done}\tskipped:{skipped}\tfailed:{failed}]")
}

#[inline]
async fn single_restore<F: Frontend>(
    frontend: &F,
    record: &CardRecord,
) -> anyhow::Result<SingleRestoreResult> {
    let Some(streak) = record
        .streak()
        .with_context(|| format!("Failed to read the SRS of {}", record.url))?
    else {
        return Ok(SingleRestoreResult::Skipped);
    };

    let review_id = frontend
        .add_to_reviews(record.reviewable_id, record.deck_id)
        .await
        .with_context(|| format!("Failed to add {} to reviews", record.url))?;
    frontend
        .set_streak(review_id, streak)
        .await
        .with_context(|| format!("Failed to set the streak of {} to {streak}", record.url))?;

    Ok(SingleRestoreResult::Done)
}

/// Restore every record in order, see the [module docs](self).
pub async fn restore_records<F: Frontend>(
    frontend: &F,
    records: &[CardRecord],
    process_bar: &ProgressBar,
) -> RestoreReport {
    let mut report = RestoreReport::default();
    process_bar.set_message(pb_msg(&report));

    for record in records {
        match single_restore(frontend, record).await {
            Ok(SingleRestoreResult::Done) => {
                report.done += 1;
            }
            Ok(SingleRestoreResult::Skipped) => {
                report.skipped += 1;
            }
            // why `suspend`: https://docs.rs/indicatif/0.17.8/indicatif/struct.ProgressBar.html#method.suspend
            // why `{:#}`: https://docs.rs/anyhow/1.0.86/anyhow/struct.Error.html#display-representations
            Err(err) => {
                report.failed += 1;
                process_bar.suspend(|| eprintln!("{:#}", err));
            }
        }
        process_bar.set_message(pb_msg(&report));
        process_bar.inc(1);
    }
    process_bar.finish();

    report
}

/// Restore a deck backup file.
///
/// An empty backup is a no-op.
///
/// # Errors
///
/// Only if the file can not be read, failed cards are counted in the report.
pub async fn restore_file<F: Frontend>(
    frontend: &F,
    path: impl AsRef<Path>,
) -> Result<RestoreReport, RestoreError> {
    let path = path.as_ref();
    log::info!("Starting restore for {}", path.display());

    let records: Vec<CardRecord> = store::load_json(path).await?;

    let prefix = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let process_bar = build_process_bar(records.len() as u64, prefix);
    let report = restore_records(frontend, &records, &process_bar).await;

    log::info!("Restore of {} finished: {report:?}", path.display());
    Ok(report)
}

/// Add every kanji of a kanji backup file to the known kanji. Returns how many were sent.
pub async fn restore_kanji<F: Frontend>(
    frontend: &F,
    path: impl AsRef<Path>,
) -> Result<usize, RestoreError> {
    let path = path.as_ref();
    log::info!("Starting restore for known kanji from {}", path.display());

    let known_kanji: KnownKanji = store::load_json(path).await?;
    let kanjis = known_kanji.kanjis();
    frontend.add_known_kanji(&kanjis).await?;

    log::info!("Restored {} known kanji", kanjis.len());
    Ok(kanjis.len())
}

/// Restore the kanji backup of `data_dir` with [`restore_kanji`], if there is one.
///
/// Returns `None` when `data_dir` has no kanji backup.
pub async fn restore_kanji_if_present<F: Frontend>(
    frontend: &F,
    data_dir: impl AsRef<Path>,
) -> Result<Option<usize>, RestoreError> {
    let path = store::kanji_file_path(data_dir);
    if !store::exists(&path).await? {
        log::info!("No kanji backup at {}, skipped", path.display());
        return Ok(None);
    }
    restore_kanji(frontend, &path).await.map(Some)
}
