use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;

use crate::sources::{
    Feed, MangaSource, MangaSuggestion, SearchResult, SourceError, fill, first_attr, http_client,
    parse_selector, read_body,
};

const API_URL: &str = "https://kissmanga.org/Search/SearchSuggest?keyword={}";
const VIEW_MANGA_URL: &str = "https://kissmanga.org{}";

pub struct Kissmanga {
    client: Client,
    api_url: String,
    view_manga_url: String,
}

impl Kissmanga {
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

fn parse_suggestions(html: &str) -> Result<Vec<MangaSuggestion>, SourceError> {
    let document = Html::parse_document(html);
    let selector = parse_selector("a.item_search_link")?;

    Ok(document
        .select(&selector)
        .map(|link| MangaSuggestion {
            reference: link.value().attr("href").unwrap_or_default().to_string(),
            title: link.text().collect::<String>().trim().to_string(),
        })
        .collect())
}

#[async_trait]
impl MangaSource for Kissmanga {
    fn feed(&self) -> Feed {
        Feed::Kissmanga
    }

    fn view_url_template(&self) -> &str {
        &self.view_manga_url
    }

    async fn search(&self, title: &str) -> SearchResult {
        if title.is_empty() {
            return Ok(None);
        }

        let path = fill(&self.api_url, &urlencoding::encode(title));
        log::debug!("Searching Kissmanga: {path}");

        let response = self.client.get(&path).send().await?;
        let page = read_body(response).await?;

        Ok(Some(parse_suggestions(&page)?))
    }

    async fn latest_chapter(&self, manga_url: &str) -> Result<String, SourceError> {
        if manga_url.is_empty() {
            log::debug!("No manga URL supplied");
            return Ok(String::new());
        }

        let response = self.client.get(manga_url).send().await?;
        let page = read_body(response).await?;

        Ok(first_attr(&page, "div.listing div div h3 a", "href")?
            .map(|href| self.view_url(&href))
            .unwrap_or_default())
    }
}
