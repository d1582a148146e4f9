use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use serde::Deserialize;

use crate::sources::{
    Feed, MangaSource, MangaSuggestion, SearchResult, SourceError, first_attr, http_client,
    read_body, read_json,
};

const API_URL: &str = "https://manganelo.com/getstorysearchjson";
const VIEW_MANGA_URL: &str = "https://manganelo.com/manga/{}";

#[derive(Deserialize, Debug)]
struct SearchEntry {
    id_encode: String,
    /// Comes back with the matched words wrapped in `<span>` highlights.
    name: String,
}

pub struct Manganelo {
    client: Client,
    api_url: String,
    view_manga_url: String,
}

impl Manganelo {
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
impl MangaSource for Manganelo {
    fn feed(&self) -> Feed {
        Feed::Manganelo
    }

    fn view_url_template(&self) -> &str {
        &self.view_manga_url
    }

    async fn search(&self, title: &str) -> SearchResult {
        if title.is_empty() {
            return Ok(None);
        }

        log::debug!("Searching Manganelo for {title}");

        let response = self
            .client
            .post(&self.api_url)
            .form(&[("searchword", title)])
            .send()
            .await?;
        let entries: Vec<SearchEntry> = read_json(response).await?;

        let suggestions = entries
            .into_iter()
            .map(|entry| MangaSuggestion {
                reference: entry.id_encode,
                title: title_case(&strip_tags(&entry.name)),
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

        Ok(first_attr(&page, "a.chapter-name", "href")?.unwrap_or_default())
    }
}

fn strip_tags(fragment: &str) -> String {
    Html::parse_fragment(fragment).root_element().text().collect()
}

/// Upper-cases every letter that starts a word.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if at_word_start {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = !(ch.is_alphanumeric() || ch == '_' || ch == '\'');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const TOKYO_GHOUL_RESULTS: &str = r##"[
        {"id": "4029", "id_encode": "read_tokyo_ghoul_manga_online_free4", "name": "<span style=\"color: #FF530D;font-weight: bold;\">tokyo<\/span> <span style=\"color: #FF530D;font-weight: bold;\">ghoul<\/span>", "lastchapter": "Chapter 145", "author": "Ishida Sui"},
        {"id": "569", "id_encode": "read_tokyo_ghoulre", "name": "<span style=\"color: #FF530D;font-weight: bold;\">tokyo<\/span> <span style=\"color: #FF530D;font-weight: bold;\">ghoul<\/span>:re", "lastchapter": "Vol.16 Chapter 179", "author": "Ishida Sui"},
        {"id": "21539", "id_encode": "tokyo_ghoul_redrawn", "name": "<span>tokyo<\/span> <span>ghoul<\/span>: Redrawn", "lastchapter": "vol.1 ch.1", "author": "Ishida Sui"},
        {"id": "8037", "id_encode": "toukyou_kushu_jack", "name": "Toukyou Kushu Jack", "lastchapter": "vol.1 ch.7", "author": "Ishida Sui"},
        {"id": "11227", "id_encode": "read_tokyo_ghoul_oneshot", "name": "<span>tokyo<\/span> <span>ghoul<\/span> (Oneshot)", "lastchapter": "ch.0", "author": "ISHIDA Sui"}
    ]"##;

    fn source_for(server: &mockito::Server) -> Manganelo {
        Manganelo::with_endpoints(&format!("{}/getstorysearchjson", server.url()), VIEW_MANGA_URL).unwrap()
    }

    #[test]
    fn title_case_capitalizes_words() {
        assert_eq!(title_case("tokyo ghoul"), "Tokyo Ghoul");
        assert_eq!(title_case("tokyo ghoul (oneshot)"), "Tokyo Ghoul (Oneshot)");
    }

    #[test]
    fn title_case_keeps_apostrophes_inside_words() {
        assert_eq!(title_case("jojo's bizarre adventure"), "Jojo's Bizarre Adventure");
        assert_eq!(title_case("the king's avatar"), "The King's Avatar");
    }

    #[test]
    fn strip_tags_keeps_text_only() {
        assert_eq!(strip_tags("<span style=\"x\">tokyo</span> <b>ghoul</b>"), "tokyo ghoul");
    }

    #[tokio::test]
    async fn empty_title_performs_no_query() {
        let server = mockito::Server::new_async().await;
        assert!(source_for(&server).search("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_posts_the_search_word() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/getstorysearchjson")
            .match_body(Matcher::UrlEncoded("searchword".into(), "tokyo ghoul".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TOKYO_GHOUL_RESULTS)
            .create_async()
            .await;

        let suggestions = source_for(&server).search("tokyo ghoul").await.unwrap().unwrap();

        mock.assert_async().await;
        assert_eq!(suggestions.len(), 5);
        assert_eq!(suggestions[0].title, "Tokyo Ghoul");
        assert_eq!(suggestions[0].reference, "read_tokyo_ghoul_manga_online_free4");
        assert_eq!(suggestions[3].title, "Toukyou Kushu Jack");
    }

    #[tokio::test]
    async fn server_error_fails_the_search() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/getstorysearchjson").with_status(500).create_async().await;

        assert!(source_for(&server).search("err").await.is_err());
    }

    #[tokio::test]
    async fn malformed_json_fails_the_search() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/getstorysearchjson")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": 4}]"#)
            .create_async()
            .await;

        let err = source_for(&server).search("badjson").await.unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[tokio::test]
    async fn latest_chapter_returns_raw_href() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/manga-od955386")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(r#"<ul class="row-content-chapter">
                <li><a class="chapter-name text-nowrap" href="https://readmanganato.com/manga-od955386/chapter-145">Chapter 145</a></li>
                <li><a class="chapter-name text-nowrap" href="https://readmanganato.com/manga-od955386/chapter-144">Chapter 144</a></li>
            </ul>"#)
            .create_async()
            .await;

        let url = source_for(&server)
            .latest_chapter(&format!("{}/manga-od955386", server.url()))
            .await
            .unwrap();
        assert_eq!(url, "https://readmanganato.com/manga-od955386/chapter-145");
    }

    #[tokio::test]
    async fn page_without_chapters_yields_empty_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/manga-empty")
            .with_status(200)
            .with_body("<html><body><p>Nothing here yet</p></body></html>")
            .create_async()
            .await;

        let url = source_for(&server)
            .latest_chapter(&format!("{}/manga-empty", server.url()))
            .await
            .unwrap();
        assert_eq!(url, "");
    }
}
