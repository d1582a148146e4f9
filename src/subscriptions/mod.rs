pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::db::StoreError;
use repository::SubscriptionsRepository;

/// A chat following one manga on one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub chat_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub manga_name: String,
    pub manga_url: String,
    /// Empty until the first chapter has been resolved.
    pub last_chapter_url: String,
    pub manga_feed: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a user picked from a search result, before a source stamps it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSubscription {
    pub chat_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub manga_name: String,
    pub manga_url: String,
}

impl<'r> FromRow<'r, SqliteRow> for Subscription {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let id_str: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id_str)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Self {
            id,
            chat_id: row.try_get("chat_id")?,
            user_id: row.try_get("user_id")?,
            user_name: row.try_get("user_name")?,
            manga_name: row.try_get("manga_name")?,
            manga_url: row.try_get("manga_url")?,
            last_chapter_url: row.try_get("last_chapter_url")?,
            manga_feed: row.try_get("manga_feed")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

pub async fn chat_subscriptions(
    repository: &dyn SubscriptionsRepository,
    chat_id: i64,
) -> Result<Vec<Subscription>, StoreError> {
    repository.find_all_by_chat_id(chat_id).await.inspect_err(|e| {
        log::warn!("Failed to load subscriptions for chat {chat_id}: {e}");
    })
}

pub async fn remove_subscription(
    repository: &dyn SubscriptionsRepository,
    id: &Uuid,
) -> Result<(), StoreError> {
    repository.delete(id).await.inspect_err(|e| {
        log::warn!("Failed to remove subscription {id}: {e}");
    })
}
