use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::Form;
use scraper::Html;

use crate::configuration::Credentials;
use crate::sources::{
    Feed, MangaSource, MangaSuggestion, SearchResult, SourceError, fill, first_attr, http_client,
    parse_selector, read_body,
};

const API_URL: &str = "https://mangadex.org/search?title={}";
const VIEW_MANGA_URL: &str = "https://mangadex.org{}";
const LOGIN_PATH: &str = "/ajax/actions.ajax.php?function=login";
const CLIENT_AGENT: &str = "mangadex-api/4.0.0";
/// `data-lang` value of English chapter rows.
const ENGLISH: &str = "1";

/// Mangadex only serves search and chapter lists to logged-in sessions.
pub struct Mangadex {
    client: Client,
    api_url: String,
    view_manga_url: String,
    credentials: Credentials,
}

impl Mangadex {
    pub fn new(credentials: Credentials) -> Result<Self, SourceError> {
        Self::with_endpoints(API_URL, VIEW_MANGA_URL, credentials)
    }

    pub fn with_endpoints(
        api_url: &str,
        view_manga_url: &str,
        credentials: Credentials,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(true)?,
            api_url: api_url.to_string(),
            view_manga_url: view_manga_url.to_string(),
            credentials,
        })
    }

    async fn login(&self) -> Result<(), SourceError> {
        let form = Form::new()
            .text("login_username", self.credentials.username.clone())
            .text("login_password", self.credentials.password.clone());

        let response = self
            .client
            .post(self.view_url(LOGIN_PATH))
            .header("User-Agent", CLIENT_AGENT)
            .header("X-Requested-With", "XMLHttpRequest")
            .multipart(form)
            .send()
            .await
            .map_err(|e| SourceError::Login(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Login(format!("status {status}")));
        }

        Ok(())
    }

    async fn get_page(&self, url: &str) -> Result<String, SourceError> {
        let response = self.client.get(url).header("User-Agent", CLIENT_AGENT).send().await?;
        read_body(response).await
    }
}

fn parse_suggestions(html: &str) -> Result<Vec<MangaSuggestion>, SourceError> {
    let document = Html::parse_document(html);
    let selector = parse_selector("div a.manga_title")?;

    Ok(document
        .select(&selector)
        .map(|link| MangaSuggestion {
            reference: link.value().attr("href").unwrap_or_default().to_string(),
            title: link.value().attr("title").unwrap_or_default().to_string(),
        })
        .collect())
}

#[async_trait]
impl MangaSource for Mangadex {
    fn feed(&self) -> Feed {
        Feed::Mangadex
    }

    fn view_url_template(&self) -> &str {
        &self.view_manga_url
    }

    async fn search(&self, title: &str) -> SearchResult {
        if title.is_empty() {
            return Ok(None);
        }

        self.login().await.inspect_err(|e| log::warn!("Mangadex {e}"))?;

        let path = fill(&self.api_url, &urlencoding::encode(title));
        log::debug!("Searching Mangadex: {path}");

        let page = self.get_page(&path).await?;
        Ok(Some(parse_suggestions(&page)?))
    }

    async fn latest_chapter(&self, manga_url: &str) -> Result<String, SourceError> {
        if manga_url.is_empty() {
            log::debug!("No manga URL supplied");
            return Ok(String::new());
        }

        if let Err(e) = self.login().await {
            log::warn!("Mangadex {e}, treating {manga_url} as having no chapters");
            return Ok(String::new());
        }

        let page = self.get_page(manga_url).await?;
        let selector = format!("div.chapter-row[data-lang=\"{ENGLISH}\"] a.text-truncate");

        Ok(first_attr(&page, &selector, "href")?
            .map(|href| self.view_url(&href))
            .unwrap_or_default())
    }
}
