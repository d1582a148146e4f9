use async_trait::async_trait;
use sqlx::{self, sqlite::SqlitePool};
use uuid::Uuid;

use crate::db::StoreError;
use crate::subscriptions::Subscription;

#[async_trait]
pub trait SubscriptionsRepository: Send + Sync {
    /// Fails with `StoreError::Conflict` when the chat already follows the manga URL.
    async fn insert(&self, subscription: &Subscription) -> Result<(), StoreError>;
    /// Replaces every mutable column of the record with the given id.
    async fn update(&self, subscription: &Subscription) -> Result<(), StoreError>;
    async fn find_all(&self) -> Result<Vec<Subscription>, StoreError>;
    async fn find_all_by_chat_id(&self, chat_id: i64) -> Result<Vec<Subscription>, StoreError>;
    async fn find_by_id(&self, id: &Uuid) -> Result<Subscription, StoreError>;
    async fn delete(&self, id: &Uuid) -> Result<(), StoreError>;
}

pub struct SqliteSubscriptionsRepository {
    pool: SqlitePool,
}

impl SqliteSubscriptionsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionsRepository for SqliteSubscriptionsRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, chat_id, user_id, user_name, manga_name, manga_url, last_chapter_url, manga_feed, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(subscription.id.to_string())
        .bind(subscription.chat_id)
        .bind(subscription.user_id)
        .bind(&subscription.user_name)
        .bind(&subscription.manga_name)
        .bind(&subscription.manga_url)
        .bind(&subscription.last_chapter_url)
        .bind(subscription.manga_feed)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                chat_id = ?2,
                user_id = ?3,
                user_name = ?4,
                manga_name = ?5,
                manga_url = ?6,
                last_chapter_url = ?7,
                manga_feed = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(subscription.id.to_string())
        .bind(subscription.chat_id)
        .bind(subscription.user_id)
        .bind(&subscription.user_name)
        .bind(&subscription.manga_name)
        .bind(&subscription.manga_url)
        .bind(&subscription.last_chapter_url)
        .bind(subscription.manga_feed)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<Subscription>, StoreError> {
        let subscriptions = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, chat_id, user_id, user_name, manga_name, manga_url, last_chapter_url, manga_feed, created_at, updated_at
            FROM subscriptions
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    async fn find_all_by_chat_id(&self, chat_id: i64) -> Result<Vec<Subscription>, StoreError> {
        let subscriptions = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, chat_id, user_id, user_name, manga_name, manga_url, last_chapter_url, manga_feed, created_at, updated_at
            FROM subscriptions
            WHERE chat_id = ?1
            ORDER BY created_at ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Subscription, StoreError> {
        let rec = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, chat_id, user_id, user_name, manga_name, manga_url, last_chapter_url, manga_feed, created_at, updated_at
            FROM subscriptions WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(rec)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() != 1 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }
}
