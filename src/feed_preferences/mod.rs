pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::db::StoreError;
use crate::sources::Feed;
use repository::FeedPreferencesRepository;

/// Feed searched when a chat never picked one.
pub const DEFAULT_FEED_CODE: i64 = 1;

/// The feed a chat searches against. At most one per chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPreference {
    pub id: Uuid,
    pub chat_id: i64,
    pub url: String,
    pub code: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum SelectFeedError {
    #[error("no chat supplied for feed selection")]
    MissingChat,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<'r> FromRow<'r, SqliteRow> for FeedPreference {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let id_str: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id_str)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Self {
            id,
            chat_id: row.try_get("chat_id")?,
            url: row.try_get("url")?,
            code: row.try_get("code")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Feed code the chat searches against, `DEFAULT_FEED_CODE` when it has no preference.
pub async fn chat_feed_code(
    repository: &dyn FeedPreferencesRepository,
    chat_id: i64,
) -> Result<i64, StoreError> {
    match repository.find_by_chat_id(chat_id).await {
        Ok(preference) => Ok(preference.code),
        Err(StoreError::NotFound) => {
            log::debug!("No feed preference for chat {chat_id}, using default feed");
            Ok(DEFAULT_FEED_CODE)
        }
        Err(e) => {
            log::warn!("Failed to look up feed preference for chat {chat_id}: {e}");
            Err(e)
        }
    }
}

/// Points the chat at `feed`, updating its existing preference in place.
pub async fn select_feed(
    repository: &dyn FeedPreferencesRepository,
    chat_id: i64,
    feed: Feed,
) -> Result<FeedPreference, SelectFeedError> {
    if chat_id == 0 {
        log::warn!("Refusing feed selection without a chat");
        return Err(SelectFeedError::MissingChat);
    }

    let now = Utc::now();
    match repository.find_by_chat_id(chat_id).await {
        Ok(mut existing) => {
            existing.code = feed.code();
            existing.url = feed.url().to_string();
            existing.updated_at = now;
            repository.update(&existing).await?;
            Ok(existing)
        }
        Err(StoreError::NotFound) => {
            let preference = FeedPreference {
                id: Uuid::now_v7(),
                chat_id,
                url: feed.url().to_string(),
                code: feed.code(),
                created_at: now,
                updated_at: now,
            };
            repository.insert(&preference).await?;
            Ok(preference)
        }
        Err(e) => {
            log::warn!("Failed to look up feed preference for chat {chat_id}: {e}");
            Err(e.into())
        }
    }
}
