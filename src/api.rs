//! A core module for talking to Bunpro.
//!
//! Bunpro has no public API, so this module drives the same endpoints its web frontend uses.
//! Everything that depends on them is kept behind the [`Frontend`] trait,
//! [`Session`] is the implementation backed by the real site.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use thiserror::Error;

use crate::config::Credentials;

/// The paths of the pages and endpoints used on Bunpro.
pub mod url {
    /// The login page, which also receives the login form.
    pub const SIGN_IN: &str = "/users/sign_in";

    /// `PATCH`, answers with the review in `data`.
    pub const ADD_TO_REVIEWS: &str = "/api/frontend/reviews/add_to_reviews";

    /// `POST`, answers with all known kanji.
    pub const ADD_KNOWN_KANJI: &str = "/api/frontend/user/add_known_kanji";

    /// `PATCH`, updates one review, e.g. its streak.
    pub fn update_via_action_type(review_id: u64) -> String {
        format!("/api/frontend/reviews/{review_id}/update_via_action_type")
    }

    /// The cookie holding the token of the frontend API, set after login.
    pub const API_TOKEN_COOKIE: &str = "frontend_api_token";
}

/// The JSON bodies sent to and received from the frontend API.
pub mod data {
    use serde::{Deserialize, Deserializer, Serialize};
    use serde_json::{Map, Value};

    #[derive(Debug, Serialize)]
    pub(crate) struct AddToReviews {
        pub(crate) reviewable_id: u64,
        pub(crate) reviewable_type: &'static str,
        pub(crate) deck_id: u64,
    }

    #[derive(Debug, Deserialize)]
    pub(crate) struct AddToReviewsResponse {
        pub(crate) data: Map<String, Value>,
    }

    #[derive(Debug, Serialize)]
    pub(crate) struct UpdateViaActionType {
        pub(crate) action_type: &'static str,
        pub(crate) new_streak: u32,
    }

    #[derive(Debug, Serialize)]
    pub(crate) struct AddKnownKanji<'a> {
        pub(crate) kanjis: &'a [String],
    }

    /// The known kanji of the user, as returned by the frontend API.
    ///
    /// This is also the format of the kanji backup file.
    #[non_exhaustive]
    #[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
    pub struct KnownKanji {
        /// Keyed by kanji. Missing or `null` for a user without known kanji.
        #[serde(default, deserialize_with = "null_as_empty")]
        pub known_kanji: Map<String, Value>,
        /// Whatever else the API sends, kept as is.
        #[serde(flatten)]
        pub extra: Map<String, Value>,
    }

    fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::deserialize(deserializer)?.unwrap_or_default())
    }

    impl KnownKanji {
        /// The kanji, in the order of the response.
        pub fn kanjis(&self) -> Vec<String> {
            self.known_kanji.keys().cloned().collect()
        }
    }
}

use data::KnownKanji;

/// Errors of [`Session::login`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LoginError {
    /// Connection error, or the login page answered with a non-success status.
    #[error("connection error")]
    Request(#[from] reqwest::Error),
    /// Bunpro showed "Invalid Email or password.".
    #[error("invalid email/password, please check your Bunpro credentials")]
    InvalidCredentials,
    /// The login form was answered with a status other than `200`.
    #[error("login failed with status code: {0}")]
    Status(StatusCode),
    /// The login page changed, or is not Bunpro's.
    #[error("no authenticity token found on the login page")]
    MissingAuthenticityToken,
    /// The login url could not be built.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors of the [`Frontend`] operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ApiError {
    /// Connection error, or a non-success status.
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    /// The path is not a valid url path.
    #[error("`{0}` can not be joined to the base url")]
    InvalidUrl(String),
    /// Not logged in, or Bunpro stopped setting the token cookie.
    #[error("no `{}` cookie, are we logged in?", url::API_TOKEN_COOKIE)]
    MissingApiToken,
    /// A successful response without what we came for.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// The operations [`crate::backup`] and [`crate::restore`] need from Bunpro.
///
/// [`Session`] implements them with the real frontend endpoints.
/// Every method fails on a non-success response.
#[allow(async_fn_in_trait)]
pub trait Frontend {
    /// Get the HTML of a page, `path` is relative to the site root and may carry a query.
    async fn page(&self, path: &str) -> Result<String, ApiError>;

    /// Add a grammar point to the reviews of a deck, returns the id of its review.
    async fn add_to_reviews(&self, reviewable_id: u64, deck_id: u64) -> Result<u64, ApiError>;

    /// Set the SRS streak of a review.
    async fn set_streak(&self, review_id: u64, streak: u32) -> Result<(), ApiError>;

    /// Add kanji to the known kanji, returns all known kanji afterwards.
    ///
    /// An empty `kanjis` only reads the current state.
    async fn add_known_kanji(&self, kanjis: &[String]) -> Result<KnownKanji, ApiError>;
}

/// The value of `name` in a `Cookie` header like `a=1; b=2`.
fn find_cookie<'a>(cookies: &'a str, name: &str) -> Option<&'a str> {
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

/// Helpers to understand the login pages.
mod login {
    use std::sync::LazyLock;

    use scraper::{Html, Selector};

    use super::*;

    const INVALID_CREDENTIALS_MSG: &str = "Invalid Email or password.";

    static AUTHENTICITY_TOKEN: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse(r#"input[name="authenticity_token"]"#).unwrap());
    static ERROR_ALERT: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("div.errors div.alert").unwrap());

    pub(super) fn authenticity_token(html: &str) -> Option<String> {
        Html::parse_document(html)
            .select(&AUTHENTICITY_TOKEN)
            .next()
            .and_then(|input| input.value().attr("value"))
            .map(String::from)
    }

    /// Classify the response of the login form.
    ///
    /// Bunpro answers a wrong password with the login page again,
    /// so the alert has to be checked before the status.
    pub(super) fn check_response(status: StatusCode, html: &str) -> Result<(), LoginError> {
        let invalid_credentials = Html::parse_document(html)
            .select(&ERROR_ALERT)
            .any(|alert| alert.text().collect::<String>().contains(INVALID_CREDENTIALS_MSG));
        if invalid_credentials {
            return Err(LoginError::InvalidCredentials);
        }
        if status != StatusCode::OK {
            return Err(LoginError::Status(status));
        }
        Ok(())
    }
}

#[inline]
fn build_client(jar: Arc<Jar>, timeout: u64) -> reqwest::Result<Client> {
    let client_builder = Client::builder().cookie_provider(jar);
    let client_builder = if timeout > 0 {
        client_builder.timeout(Duration::from_secs(timeout))
    } else {
        client_builder
    };
    client_builder.build()
}

/// A logged-in session on Bunpro, alive for one run of the program.
///
/// # Example
///
/// ```no_run
/// use bunpro_backup::api::{Frontend, Session};
/// use bunpro_backup::config::{Config, Credentials};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::default();
///     let credentials = Credentials::new("you@example.com", "yourpassword");
///
///     let session = Session::login(config.base_url, config.timeout, &credentials).await?;
///     let _html = session.page("/decks/nn10ai/Bunpro-N5-Grammar").await?;
///
///     Ok(())
/// }
/// ```
pub struct Session {
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
}

impl Session {
    /// Build a session which is not logged in yet.
    ///
    /// `timeout` is in seconds, `0` keeps the client default.
    pub fn build(base_url: Url, timeout: u64) -> reqwest::Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = build_client(Arc::clone(&jar), timeout)?;
        Ok(Self {
            client,
            jar,
            base_url,
        })
    }

    /// Build a session and log in with `credentials`.
    ///
    /// # Errors
    ///
    /// - [`LoginError::InvalidCredentials`] if Bunpro rejects the credentials.
    /// - [`LoginError::Status`] if the login form is answered with a non-200 status.
    /// - [`LoginError::Request`] on connection errors.
    pub async fn login(
        base_url: Url,
        timeout: u64,
        credentials: &Credentials,
    ) -> Result<Self, LoginError> {
        let session = Self::build(base_url, timeout)?;
        session.sign_in(credentials).await?;
        Ok(session)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<(), LoginError> {
        let sign_in_url = self.endpoint(url::SIGN_IN)?;

        log::info!("Logging in as {}...", credentials.email);
        let login_page = self
            .client
            .get(sign_in_url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let authenticity_token =
            login::authenticity_token(&login_page).ok_or(LoginError::MissingAuthenticityToken)?;

        let form = [
            ("utf8", "✓"),
            ("authenticity_token", authenticity_token.as_str()),
            ("user[email]", credentials.email.as_str()),
            ("user[password]", credentials.password.as_str()),
            ("user[remember_me]", "1"),
            ("commit", "Log in"),
        ];
        let response = self.client.post(sign_in_url).form(&form).send().await?;
        let status = response.status();
        let html = response.text().await?;
        login::check_response(status, &html)?;

        log::info!("Login succeeded.");
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|_| ApiError::InvalidUrl(path.to_owned()))
    }

    /// The frontend API token, read from the cookie set by the login.
    fn api_token(&self) -> Result<String, ApiError> {
        let cookies = self
            .jar
            .cookies(&self.base_url)
            .ok_or(ApiError::MissingApiToken)?;
        let cookies = cookies.to_str().map_err(|_| ApiError::MissingApiToken)?;
        find_cookie(cookies, url::API_TOKEN_COOKIE)
            .map(String::from)
            .ok_or(ApiError::MissingApiToken)
    }

    /// A JSON request to the frontend API, authorized with the API token.
    fn api_request<T>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<RequestBuilder, ApiError>
    where
        T: Serialize + ?Sized,
    {
        let token = self.api_token()?;
        let target_url = self.endpoint(path)?;
        log::debug!("{method} {target_url}");
        Ok(self
            .client
            .request(method, target_url)
            .header(AUTHORIZATION, format!("Token token={token}"))
            .json(body))
    }
}

impl Frontend for Session {
    async fn page(&self, path: &str) -> Result<String, ApiError> {
        let target_url = self.endpoint(path)?;
        log::debug!("GET {target_url}");
        let html = self
            .client
            .get(target_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(html)
    }

    async fn add_to_reviews(&self, reviewable_id: u64, deck_id: u64) -> Result<u64, ApiError> {
        let body = data::AddToReviews {
            reviewable_id,
            reviewable_type: "GrammarPoint",
            deck_id,
        };
        let response: data::AddToReviewsResponse = self
            .api_request(Method::PATCH, url::ADD_TO_REVIEWS, &body)?
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .data
            .get("id")
            .and_then(crate::deck::id_from_json)
            .ok_or_else(|| {
                ApiError::UnexpectedResponse(format!(
                    "no review id for reviewable {reviewable_id}"
                ))
            })
    }

    async fn set_streak(&self, review_id: u64, streak: u32) -> Result<(), ApiError> {
        let body = data::UpdateViaActionType {
            action_type: "set_streak",
            new_streak: streak,
        };
        self.api_request(
            Method::PATCH,
            &url::update_via_action_type(review_id),
            &body,
        )?
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }

    async fn add_known_kanji(&self, kanjis: &[String]) -> Result<KnownKanji, ApiError> {
        let body = data::AddKnownKanji { kanjis };
        let known_kanji = self
            .api_request(Method::POST, url::ADD_KNOWN_KANJI, &body)?
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(known_kanji)
    }
}

/// An in-memory Bunpro, serving pages rendered from its own SRS state.
#[cfg(test)]
pub(crate) mod fake {
    use std::cell::RefCell;
    use std::collections::{BTreeMap, BTreeSet, HashMap};

    use serde_json::Value;

    use super::*;

    pub(crate) const DECK_PATH: &str = "/decks/nn10ai/Bunpro-N5-Grammar";
    pub(crate) const DECK_ID: u64 = 42;
    const GRAMMAR_POINT_PREFIX: &str = "/grammar_points/";

    #[derive(Default)]
    pub(crate) struct FakeFrontend {
        /// reviewable id -> streak, `None` if never studied
        pub(crate) streaks: RefCell<BTreeMap<u64, Option<u32>>>,
        /// review id -> reviewable id
        pub(crate) reviews: RefCell<HashMap<u64, u64>>,
        pub(crate) kanji: RefCell<BTreeSet<String>>,
        /// reviewable ids whose `add_to_reviews` fails
        pub(crate) broken: BTreeSet<u64>,
        pub(crate) requests: RefCell<u64>,
    }

    impl FakeFrontend {
        pub(crate) fn with_streaks(streaks: impl IntoIterator<Item = (u64, Option<u32>)>) -> Self {
            Self {
                streaks: RefCell::new(streaks.into_iter().collect()),
                ..Default::default()
            }
        }

        fn render_deck(&self) -> String {
            let cards: String = self
                .streaks
                .borrow()
                .iter()
                .map(|(id, streak)| {
                    let srs = streak
                        .map(|streak| format!("<span>SRS {streak}</span>"))
                        .unwrap_or_default();
                    format!(
                        r#"<div class="deck-info-card">
                             <a href="{GRAMMAR_POINT_PREFIX}{id}?deck_id={DECK_ID}">文法 {id}</a>
                             {srs}
                           </div>"#
                    )
                })
                .collect();
            format!("<html><body>{cards}</body></html>")
        }

        fn render_grammar_point(id: u64) -> String {
            format!(
                r#"<html><body><script id="__NEXT_DATA__" type="application/json">
                     {{"props": {{"pageProps": {{"reviewable": {{"id": {id}}}}}}}}}
                   </script></body></html>"#
            )
        }
    }

    impl Frontend for FakeFrontend {
        async fn page(&self, path: &str) -> Result<String, ApiError> {
            *self.requests.borrow_mut() += 1;
            let path = path.split('?').next().unwrap_or_default();
            if path == DECK_PATH {
                return Ok(self.render_deck());
            }
            path.strip_prefix(GRAMMAR_POINT_PREFIX)
                .and_then(|id| id.parse::<u64>().ok())
                .filter(|id| self.streaks.borrow().contains_key(id))
                .map(Self::render_grammar_point)
                .ok_or_else(|| ApiError::UnexpectedResponse(format!("404 for {path}")))
        }

        async fn add_to_reviews(&self, reviewable_id: u64, deck_id: u64) -> Result<u64, ApiError> {
            *self.requests.borrow_mut() += 1;
            if deck_id != DECK_ID || self.broken.contains(&reviewable_id) {
                return Err(ApiError::UnexpectedResponse(String::from("422")));
            }
            let review_id = reviewable_id + 10_000;
            self.reviews.borrow_mut().insert(review_id, reviewable_id);
            self.streaks
                .borrow_mut()
                .entry(reviewable_id)
                .or_insert(Some(0));
            Ok(review_id)
        }

        async fn set_streak(&self, review_id: u64, streak: u32) -> Result<(), ApiError> {
            *self.requests.borrow_mut() += 1;
            let reviewable_id = *self
                .reviews
                .borrow()
                .get(&review_id)
                .ok_or_else(|| ApiError::UnexpectedResponse(String::from("404")))?;
            self.streaks
                .borrow_mut()
                .insert(reviewable_id, Some(streak));
            Ok(())
        }

        async fn add_known_kanji(&self, kanjis: &[String]) -> Result<KnownKanji, ApiError> {
            *self.requests.borrow_mut() += 1;
            self.kanji.borrow_mut().extend(kanjis.iter().cloned());
            Ok(KnownKanji {
                known_kanji: self
                    .kanji
                    .borrow()
                    .iter()
                    .map(|kanji| (kanji.clone(), Value::Bool(true)))
                    .collect(),
                extra: [(String::from("status"), Value::from("ok"))]
                    .into_iter()
                    .collect(),
            })
        }
    }
}
