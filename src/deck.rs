//! The deck and card data extracted from Bunpro's pages.
//!
//! - [`DeckPath`] is a validated `/decks/...` path, checked before any request is sent.
//! - [`CardRecord`] is one grammar point of a deck, and the unit stored in a backup file.
//! - [`parse`] turns the HTML of deck and grammar point pages into those records.

use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DEFAULT_BASE_URL;

/// The path prefix every deck lives under.
pub const DECK_PATH_PREFIX: &str = "/decks/";

/// Errors of reading decks and cards.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DeckError {
    /// Rejected before any request is sent.
    #[error("`{0}` is not a deck, expected a path like `/decks/<id>/<name>`")]
    InvalidPath(String),
    /// No `div.deck-info-card` on the deck page.
    #[error("no card found on the deck page")]
    NoCards,
    /// Holds the index of the card.
    #[error("card #{0} on the deck page has no link")]
    MissingLink(usize),
    /// The grammar point page is not a Next.js page anymore.
    #[error("no `__NEXT_DATA__` script found on `{0}`")]
    MissingNextData(String),
    /// `__NEXT_DATA__` is not JSON.
    #[error("failed to parse `__NEXT_DATA__` of `{url}`")]
    InvalidNextData {
        /// The grammar point page.
        url: String,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// `__NEXT_DATA__` has no numeric `props.pageProps.reviewable.id`.
    #[error("no reviewable id found on `{0}`")]
    MissingReviewableId(String),
    /// The card link has no integer `deck_id` query.
    #[error("no `deck_id` found in `{0}`")]
    MissingDeckId(String),
    /// The label is not like `SRS <n>`.
    #[error("unrecognized SRS label `{0}`")]
    InvalidSrs(String),
}

/// A path under [`DECK_PATH_PREFIX`], e.g. `/decks/nn10ai/Bunpro-N5-Grammar`.
///
/// A full `http(s)://` URL is accepted as well, only its path is kept.
///
/// # Example
///
/// ```rust
/// use bunpro_backup::deck::DeckPath;
///
/// let deck: DeckPath = "https://bunpro.jp/decks/nn10ai/Bunpro-N5-Grammar".parse().unwrap();
/// assert_eq!(deck.as_str(), "/decks/nn10ai/Bunpro-N5-Grammar");
/// assert_eq!(deck.slug(), "bunpro-n5-grammar");
///
/// assert!("/grammar_points/foo".parse::<DeckPath>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeckPath(String);

impl DeckPath {
    /// The path, without query or fragment.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lowercased last segment of the path, used to name the backup file.
    pub fn slug(&self) -> String {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }
}

impl FromStr for DeckPath {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = || DeckError::InvalidPath(s.to_owned());

        let path = if input.starts_with("http://") || input.starts_with("https://") {
            Url::parse(input).map_err(|_| invalid())?.path().to_owned()
        } else {
            // drop any query or fragment
            input
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_owned()
        };

        match path.strip_prefix(DECK_PATH_PREFIX) {
            Some(rest) if !rest.trim_matches('/').is_empty() => Ok(Self(path)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for DeckPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One grammar point of a deck, as stored in a backup file.
///
/// The field names are part of the backup file format.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CardRecord {
    /// Link of the grammar point page, including the `deck_id` query.
    pub url: String,
    /// The raw SRS label from the deck page, e.g. `"SRS 3"`.
    /// `None` if the grammar point has never been studied.
    pub srs: Option<String>,
    /// Id of the grammar point, as sent to `add_to_reviews`.
    pub reviewable_id: u64,
    /// Id of the deck, from the `deck_id` query of [`Self::url`].
    pub deck_id: u64,
}

impl CardRecord {
    /// A record as read from the pages, see the fields.
    pub fn new(
        url: impl Into<String>,
        srs: Option<String>,
        reviewable_id: u64,
        deck_id: u64,
    ) -> Self {
        Self {
            url: url.into(),
            srs,
            reviewable_id,
            deck_id,
        }
    }

    /// The streak to restore, read from the second word of [`Self::srs`].
    ///
    /// # Errors
    ///
    /// If the label has no numeric second word.
    pub fn streak(&self) -> Result<Option<u32>, DeckError> {
        let Some(srs) = &self.srs else {
            return Ok(None);
        };
        srs.split_whitespace()
            .nth(1)
            .and_then(|streak| streak.parse().ok())
            .map(Some)
            .ok_or_else(|| DeckError::InvalidSrs(srs.clone()))
    }
}

/// Read an id which the site sends either as a number or as a numeric string.
pub(crate) fn id_from_json(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(number) => number.as_u64(),
        serde_json::Value::String(string) => string.parse().ok(),
        _ => None,
    }
}

/// HTML parsing of deck and grammar point pages.
pub mod parse {
    use std::sync::LazyLock;

    use scraper::{ElementRef, Html, Selector};

    use super::*;

    static DECK_CARD: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("div.deck-info-card").unwrap());
    static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
    static SPAN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());
    static NEXT_DATA: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#"script#__NEXT_DATA__[type="application/json"]"#).unwrap()
    });

    /// What the deck page tells about a card, before its own page is visited.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CardSummary {
        /// See [`CardRecord::url`](super::CardRecord::url).
        pub url: String,
        /// See [`CardRecord::srs`](super::CardRecord::srs).
        pub srs: Option<String>,
    }

    /// The first `span` holding only text that mentions `SRS`.
    fn srs_label(card: ElementRef<'_>) -> Option<String> {
        card.select(&SPAN)
            .filter(|span| span.children().all(|child| child.value().is_text()))
            .map(|span| span.text().collect::<String>())
            .find(|text| text.contains("SRS"))
            .map(|text| text.trim().to_owned())
    }

    /// Collect every `div.deck-info-card` of a deck page.
    ///
    /// # Errors
    ///
    /// If there is no card, or a card has no link.
    pub fn deck_page(html: &str) -> Result<Vec<CardSummary>, DeckError> {
        let document = Html::parse_document(html);

        let cards = document
            .select(&DECK_CARD)
            .enumerate()
            .map(|(index, card)| {
                let url = card
                    .select(&LINK)
                    .next()
                    .and_then(|link| link.value().attr("href"))
                    .ok_or(DeckError::MissingLink(index))?
                    .to_owned();
                Ok(CardSummary {
                    url,
                    srs: srs_label(card),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if cards.is_empty() {
            return Err(DeckError::NoCards);
        }
        Ok(cards)
    }

    /// Read `props.pageProps.reviewable.id` from the `__NEXT_DATA__` script of a grammar point page.
    pub fn reviewable_id(html: &str, url: &str) -> Result<u64, DeckError> {
        let document = Html::parse_document(html);

        let script = document
            .select(&NEXT_DATA)
            .next()
            .ok_or_else(|| DeckError::MissingNextData(url.to_owned()))?
            .text()
            .collect::<String>();
        let data: serde_json::Value =
            serde_json::from_str(&script).map_err(|source| DeckError::InvalidNextData {
                url: url.to_owned(),
                source,
            })?;

        data.pointer("/props/pageProps/reviewable/id")
            .and_then(id_from_json)
            .ok_or_else(|| DeckError::MissingReviewableId(url.to_owned()))
    }

    /// Read the `deck_id` query parameter of a card link, which may be relative.
    pub fn deck_id(url: &str) -> Result<u64, DeckError> {
        let missing = || DeckError::MissingDeckId(url.to_owned());

        // only the query matters, so any base will do for relative links
        let base = Url::parse(DEFAULT_BASE_URL).map_err(|_| missing())?;
        let absolute = base.join(url).map_err(|_| missing())?;
        let deck_id = absolute
            .query_pairs()
            .find(|(key, _)| key == "deck_id")
            .and_then(|(_, value)| value.parse().ok());
        deck_id.ok_or_else(missing)
    }
}
