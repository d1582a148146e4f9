use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::sources::{
    Feed, MangaSource, MangaSuggestion, SearchResult, SourceError, fill, first_attr, http_client,
    read_body, read_json,
};

const API_URL: &str = "https://mangareader.pw/search?query={}";
const VIEW_MANGA_URL: &str = "https://mangareader.pw/manga/{}";

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    suggestions: Vec<MangaSuggestion>,
}

pub struct MangaReader {
    client: Client,
    api_url: String,
    view_manga_url: String,
}

impl MangaReader {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_endpoints(API_URL, VIEW_MANGA_URL)
    }

    pub fn with_endpoints(api_url: &str, view_manga_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(false)?,
            api_url: api_url.to_string(),
            view_manga_url: view_manga_url.to_string(),
        })
    }
}

#[async_trait]
impl MangaSource for MangaReader {
    fn feed(&self) -> Feed {
        Feed::MangaReader
    }

    fn view_url_template(&self) -> &str {
        &self.view_manga_url
    }

    async fn search(&self, title: &str) -> SearchResult {
        if title.is_empty() {
            return Ok(None);
        }

        let path = fill(&self.api_url, &urlencoding::encode(title));
        log::debug!("Searching Manga Reader: {path}");

        let response = self.client.get(&path).send().await?;
        let decoded: SearchResponse = read_json(response).await?;

        Ok(Some(decoded.suggestions))
    }

    async fn latest_chapter(&self, manga_url: &str) -> Result<String, SourceError> {
        if manga_url.is_empty() {
            log::debug!("No manga URL supplied");
            return Ok(String::new());
        }

        let response = self.client.get(manga_url).send().await?;
        let page = read_body(response).await?;

        Ok(first_attr(&page, "a.chapter-name", "href")?.unwrap_or_default())
    }
}
