use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::sources::{
    Feed, MangaSource, MangaSuggestion, SearchResult, SourceError, fill, first_attr, http_client,
    read_body, read_json,
};

const API_URL: &str = "https://mangaeden.com/ajax/search-manga/?term={}";
const VIEW_MANGA_URL: &str = "https://mangaeden.com{}";

#[derive(Deserialize, Debug)]
struct SearchEntry {
    url: String,
    value: String,
}

pub struct MangaEden {
    client: Client,
    api_url: String,
    view_manga_url: String,
}

impl MangaEden {
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
impl MangaSource for MangaEden {
    fn feed(&self) -> Feed {
        Feed::MangaEden
    }

    fn view_url_template(&self) -> &str {
        &self.view_manga_url
    }

    async fn search(&self, title: &str) -> SearchResult {
        if title.is_empty() {
            return Ok(None);
        }

        let path = fill(&self.api_url, &urlencoding::encode(title));
        log::debug!("Searching Manga Eden: {path}");

        let response = self.client.get(&path).send().await?;
        let entries: Vec<SearchEntry> = read_json(response).await?;

        // Italian editions are listed alongside the English ones
        let suggestions = entries
            .into_iter()
            .filter(|entry| !entry.url.contains("it-manga"))
            .map(|entry| MangaSuggestion {
                reference: entry.url,
                title: entry.value,
            })
            .collect();

        Ok(Some(suggestions))
    }

    async fn latest_chapter(&self, manga_url: &str) -> Result<String, SourceError> {
        if manga_url.is_empty() {
            log::debug!("No manga URL supplied");
            return Ok(String::new());
        }

        let response = self.client.get(manga_url).send().await?;
        let page = read_body(response).await?;

        Ok(first_attr(&page, "a.chapterLink", "href")?
            .map(|href| self.view_url(&href))
            .unwrap_or_default())
    }
}
