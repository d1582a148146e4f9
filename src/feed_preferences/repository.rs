use async_trait::async_trait;
use sqlx::{self, sqlite::SqlitePool};

use crate::db::StoreError;
use crate::feed_preferences::FeedPreference;

#[async_trait]
pub trait FeedPreferencesRepository: Send + Sync {
    async fn insert(&self, preference: &FeedPreference) -> Result<(), StoreError>;
    async fn update(&self, preference: &FeedPreference) -> Result<(), StoreError>;
    async fn find_by_chat_id(&self, chat_id: i64) -> Result<FeedPreference, StoreError>;
}

pub struct SqliteFeedPreferencesRepository {
    pool: SqlitePool,
}

impl SqliteFeedPreferencesRepository {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }
}

#[async_trait]
impl FeedPreferencesRepository for SqliteFeedPreferencesRepository {
    async fn insert(&self, preference: &FeedPreference) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO feed_preferences (id, chat_id, url, code, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(preference.id.to_string())
        .bind(preference.chat_id)
        .bind(&preference.url)
        .bind(preference.code)
        .bind(preference.created_at)
        .bind(preference.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, preference: &FeedPreference) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE feed_preferences SET chat_id = ?2, url = ?3, code = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(preference.id.to_string())
        .bind(preference.chat_id)
        .bind(&preference.url)
        .bind(preference.code)
        .bind(preference.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn find_by_chat_id(&self, chat_id: i64) -> Result<FeedPreference, StoreError> {
        let rec = sqlx::query_as::<_, FeedPreference>(
            r#"
            SELECT id, chat_id, url, code, created_at, updated_at
            FROM feed_preferences WHERE chat_id = ?1
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(rec)
    }
}
