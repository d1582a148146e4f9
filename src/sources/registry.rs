use std::collections::HashMap;
use std::sync::Arc;

use crate::configuration::Configuration;
use crate::sources::{
    Feed, Kissmanga, MangaEden, MangaReader, MangaSource, Mangadex, Manganelo, SourceError,
};

/// Feed code → source lookup. Unknown codes have no source.
pub struct SourceRegistry {
    sources: HashMap<Feed, Arc<dyn MangaSource>>,
}

impl SourceRegistry {
    pub fn from_configuration(config: &Configuration) -> Result<Self, SourceError> {
        let mut sources: Vec<Arc<dyn MangaSource>> = vec![
            Arc::new(MangaReader::new()?),
            Arc::new(Manganelo::new()?),
            Arc::new(MangaEden::new()?),
            Arc::new(Kissmanga::new()?),
        ];

        match &config.mangadex_credentials {
            Some(credentials) => sources.push(Arc::new(Mangadex::new(credentials.clone())?)),
            None => log::info!("Mangadex credentials not configured, feed disabled"),
        }

        Ok(Self::from_sources(sources))
    }

    pub fn from_sources(sources: Vec<Arc<dyn MangaSource>>) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| (source.feed(), source))
            .collect();
        Self { sources }
    }

    pub fn get(&self, code: i64) -> Option<Arc<dyn MangaSource>> {
        let feed = Feed::from_code(code)?;
        self.sources.get(&feed).cloned()
    }

    /// Registered feeds, ordered by code.
    pub fn feeds(&self) -> Vec<Feed> {
        let mut feeds: Vec<Feed> = self.sources.keys().copied().collect();
        feeds.sort_by_key(|feed| feed.code());
        feeds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Credentials;
    use crate::sources::test_support::StaticSource;

    fn config(credentials: Option<Credentials>) -> Configuration {
        Configuration::from_lookup(|key| match key {
            "TELOXIDE_TOKEN" => Some("token".to_string()),
            _ => None,
        })
        .map(|mut c| {
            c.mangadex_credentials = credentials;
            c
        })
        .unwrap()
    }

    #[test]
    fn lookup_by_code() {
        let registry = SourceRegistry::from_configuration(&config(None)).unwrap();

        assert_eq!(registry.get(1).unwrap().feed(), Feed::MangaReader);
        assert_eq!(registry.get(2).unwrap().feed(), Feed::Manganelo);
        assert_eq!(registry.get(3).unwrap().feed(), Feed::MangaEden);
        assert_eq!(registry.get(4).unwrap().feed(), Feed::Kissmanga);
    }

    #[test]
    fn unknown_codes_have_no_source() {
        let registry = SourceRegistry::from_configuration(&config(None)).unwrap();
        assert!(registry.get(0).is_none());
        assert!(registry.get(42).is_none());
        assert!(registry.get(-1).is_none());
    }

    #[test]
    fn mangadex_requires_credentials() {
        let without = SourceRegistry::from_configuration(&config(None)).unwrap();
        assert!(without.get(5).is_none());
        assert_eq!(without.feeds().len(), 4);

        let with = SourceRegistry::from_configuration(&config(Some(Credentials {
            username: "reader".to_string(),
            password: "secret".to_string(),
        })))
        .unwrap();
        assert_eq!(with.get(5).unwrap().feed(), Feed::Mangadex);
        assert_eq!(with.feeds().last(), Some(&Feed::Mangadex));
    }

    #[test]
    fn feeds_are_ordered_by_code() {
        let registry = SourceRegistry::from_sources(vec![
            Arc::new(StaticSource::new(Feed::Kissmanga, "")),
            Arc::new(StaticSource::new(Feed::MangaReader, "")),
        ]);
        assert_eq!(registry.feeds(), vec![Feed::MangaReader, Feed::Kissmanga]);
    }
}
