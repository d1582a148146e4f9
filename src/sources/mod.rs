pub mod kissmanga;
pub mod mangadex;
pub mod mangaeden;
pub mod manganelo;
pub mod mangareader;
pub mod registry;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::StoreError;
use crate::subscriptions::repository::SubscriptionsRepository;
use crate::subscriptions::{NewSubscription, Subscription};

pub use kissmanga::Kissmanga;
pub use mangadex::Mangadex;
pub use mangaeden::MangaEden;
pub use manganelo::Manganelo;
pub use mangareader::MangaReader;
pub use registry::SourceRegistry;

const USER_AGENT: &str = "mangagram/0.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The manga websites a chat can search and subscribe through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    MangaReader,
    Manganelo,
    MangaEden,
    Kissmanga,
    Mangadex,
}

impl Feed {
    pub const ALL: [Feed; 5] = [
        Feed::MangaReader,
        Feed::Manganelo,
        Feed::MangaEden,
        Feed::Kissmanga,
        Feed::Mangadex,
    ];

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|feed| feed.code() == code)
    }

    pub fn code(self) -> i64 {
        match self {
            Feed::MangaReader => 1,
            Feed::Manganelo => 2,
            Feed::MangaEden => 3,
            Feed::Kissmanga => 4,
            Feed::Mangadex => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Feed::MangaReader => "Manga Reader",
            Feed::Manganelo => "Manganelo",
            Feed::MangaEden => "Manga Eden",
            Feed::Kissmanga => "Kissmanga",
            Feed::Mangadex => "Mangadex",
        }
    }

    pub fn url(self) -> &'static str {
        match self {
            Feed::MangaReader => "https://mangareader.pw",
            Feed::Manganelo => "https://manganelo.com",
            Feed::MangaEden => "https://mangaeden.com",
            Feed::Kissmanga => "https://kissmanga.org",
            Feed::Mangadex => "https://mangadex.org",
        }
    }
}

/// One search hit: a source-specific reference and the title shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MangaSuggestion {
    #[serde(rename = "data")]
    pub reference: String,
    #[serde(rename = "value")]
    pub title: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(StatusCode),
    #[error("could not decode response: {0}")]
    Decode(reqwest::Error),
    #[error("invalid selector: {0}")]
    Selector(String),
    #[error("login failed: {0}")]
    Login(String),
}

/// `Ok(None)` means no query was performed (empty title).
pub type SearchResult = Result<Option<Vec<MangaSuggestion>>, SourceError>;

#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("{0}")]
    Validation(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Created(Subscription),
    AlreadySubscribed,
}

#[async_trait]
pub trait MangaSource: Send + Sync {
    fn feed(&self) -> Feed;

    /// URL template with a single `{}` slot for a suggestion reference.
    fn view_url_template(&self) -> &str;

    fn view_url(&self, reference: &str) -> String {
        fill(self.view_url_template(), reference)
    }

    async fn search(&self, title: &str) -> SearchResult;

    /// URL of the newest chapter on `manga_url`, empty when the page lists none.
    async fn latest_chapter(&self, manga_url: &str) -> Result<String, SourceError>;

    async fn subscribe(
        &self,
        subscriptions: &dyn SubscriptionsRepository,
        draft: NewSubscription,
    ) -> Result<SubscribeOutcome, SubscribeError> {
        if draft.manga_name.is_empty() || draft.manga_url.is_empty() {
            log::warn!("No manga supplied for subscription");
            return Err(SubscribeError::Validation("no manga supplied for subscription"));
        }

        if draft.chat_id == 0 {
            log::warn!("No chat supplied for subscription");
            return Err(SubscribeError::Validation("no chat supplied for subscription"));
        }

        let last_chapter_url = match self.latest_chapter(&draft.manga_url).await {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Could not resolve latest chapter of {}: {e}", draft.manga_url);
                String::new()
            }
        };

        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::now_v7(),
            chat_id: draft.chat_id,
            user_id: draft.user_id,
            user_name: draft.user_name,
            manga_name: draft.manga_name,
            manga_url: draft.manga_url,
            last_chapter_url,
            manga_feed: self.feed().code(),
            created_at: now,
            updated_at: now,
        };

        match subscriptions.insert(&subscription).await {
            Ok(()) => {
                log::info!("Chat {} subscribed to {}", subscription.chat_id, subscription.manga_name);
                Ok(SubscribeOutcome::Created(subscription))
            }
            Err(StoreError::Conflict) => {
                log::debug!("Chat {} already follows {}", subscription.chat_id, subscription.manga_url);
                Ok(SubscribeOutcome::AlreadySubscribed)
            }
            Err(e) => {
                log::warn!("There was an error creating new subscription: {e}");
                Err(e.into())
            }
        }
    }
}

pub(crate) fn fill(template: &str, value: &str) -> String {
    template.replacen("{}", value, 1)
}

pub(crate) fn http_client(cookies: bool) -> Result<Client, SourceError> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .cookie_store(cookies)
        .build()?;
    Ok(client)
}

/// Body of a successful response, anything but 2xx is an error.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<String, SourceError> {
    let status = response.status();
    if !status.is_success() {
        log::warn!("Status code was not OK: {} {}", status, response.url());
        return Err(SourceError::Status(status));
    }
    Ok(response.text().await?)
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SourceError> {
    let status = response.status();
    if !status.is_success() {
        log::warn!("Status code was not OK: {} {}", status, response.url());
        return Err(SourceError::Status(status));
    }
    response.json::<T>().await.map_err(|e| {
        if e.is_decode() { SourceError::Decode(e) } else { SourceError::Http(e) }
    })
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, SourceError> {
    Selector::parse(selector).map_err(|e| SourceError::Selector(format!("{selector}: {e:?}")))
}

/// `attr` of the first element matching `selector`.
pub(crate) fn first_attr(html: &str, selector: &str, attr: &str) -> Result<Option<String>, SourceError> {
    let document = Html::parse_document(html);
    let selector = parse_selector(selector)?;
    Ok(document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(str::to_string))
}
