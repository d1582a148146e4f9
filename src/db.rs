use crate::configuration;
use crate::feed_preferences::repository::{FeedPreferencesRepository, SqliteFeedPreferencesRepository};
use crate::subscriptions::repository::{SqliteSubscriptionsRepository, SubscriptionsRepository};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::sync::Arc;

/// Outcome classes of a store call that callers are expected to branch on.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record violates a uniqueness constraint")]
    Conflict,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => StoreError::Conflict,
            other => StoreError::Database(other),
        }
    }
}

#[derive(Clone)]
pub struct RepositoryProvider {
    subscriptions: Arc<dyn SubscriptionsRepository>,
    feed_preferences: Arc<dyn FeedPreferencesRepository>,
}

impl RepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let subscriptions = Arc::new(SqliteSubscriptionsRepository::new(pool.clone())) as Arc<dyn SubscriptionsRepository>;
        let feed_preferences = Arc::new(SqliteFeedPreferencesRepository::new(pool)) as Arc<dyn FeedPreferencesRepository>;
        Self { subscriptions, feed_preferences }
    }

    pub fn subscriptions(&self) -> Arc<dyn SubscriptionsRepository> {
        self.subscriptions.clone()
    }

    pub fn feed_preferences(&self) -> Arc<dyn FeedPreferencesRepository> {
        self.feed_preferences.clone()
    }
}

pub async fn initialize_db(config: &configuration::Configuration) -> Result<SqlitePool, Box<dyn std::error::Error>> {
    let options = SqliteConnectOptions::new()
        .filename(&config.database_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    log::info!("Database ready at {}", config.database_path);

    Ok(pool)
}

#[cfg(test)]
pub(crate) async fn setup_test_pool() -> SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to create in-memory sqlite pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initialize_db_creates_missing_file_and_schema() {
        let path = std::env::temp_dir().join(format!("mangagram-{}.db", uuid::Uuid::now_v7()));
        let path_string = path.to_string_lossy().to_string();
        let config = configuration::Configuration::from_lookup(|key| match key {
            "TELOXIDE_TOKEN" => Some("token".to_string()),
            "DATABASE_PATH" => Some(path_string.clone()),
            _ => None,
        })
        .unwrap();

        let pool = initialize_db(&config).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(StoreError::from(sqlx::Error::RowNotFound), StoreError::NotFound));
    }

    #[test]
    fn other_errors_stay_database_errors() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test]
    async fn unique_violation_maps_to_conflict() {
        let pool = setup_test_pool().await;
        let insert = r#"
            INSERT INTO subscriptions (id, chat_id, user_id, user_name, manga_name, manga_url, last_chapter_url, manga_feed, created_at, updated_at)
            VALUES (?1, 1, 1, 'user', 'Naruto', 'https://example.com/naruto', '', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')
        "#;

        sqlx::query(insert).bind("a").execute(&pool).await.unwrap();
        let err = sqlx::query(insert).bind("b").execute(&pool).await.unwrap_err();

        assert!(matches!(StoreError::from(err), StoreError::Conflict));
    }
}
